//! Direction mapping: target position to per-motor vibration intensities.
//!
//! Two actuator layouts are supported:
//!
//! - `MotorLayout::Two`: a left/right pair. Output is always scaled by closeness to
//!   the frame centre and biased toward the side the target is on.
//! - `MotorLayout::Eight`: a radial ring at 45° steps. Exactly one motor, the one
//!   nearest the target bearing, is driven at a flat strength. Closeness only scales
//!   it when `distance_scaled` is set.
//!
//! Bearings are measured in image coordinates (y grows downward), so a target below
//! the frame centre has a bearing of +90° and selects `front`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::frame::{FrameGeometry, Point};

/// Maximum intensity of a single motor.
pub const MAX_INTENSITY: f32 = 100.0;
/// Offsets within this band of the centre drive both motors equally.
pub const CENTER_DEADBAND: f32 = 0.1;
/// Intensities above this are active and get raised to `FLOOR_INTENSITY`.
pub const FLOOR_THRESHOLD: f32 = 10.0;
/// Lowest perceptible intensity for an active motor.
pub const FLOOR_INTENSITY: f32 = 30.0;

/// Radial motor table, in tie-break order: (name, bearing in degrees).
pub const EIGHT_MOTOR_TABLE: [(&str, f32); 8] = [
    ("right", 0.0),
    ("front_right", 45.0),
    ("front", 90.0),
    ("front_left", 135.0),
    ("left", 180.0),
    ("back_left", -135.0),
    ("back", -90.0),
    ("back_right", -45.0),
];

const TWO_MOTOR_NAMES: [&str; 2] = ["left", "right"];

/// Physical actuator arrangement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorLayout {
    Two,
    Eight,
}

impl MotorLayout {
    /// Motor names this layout drives, in table order.
    pub fn motor_names(&self) -> Vec<&'static str> {
        match self {
            MotorLayout::Two => TWO_MOTOR_NAMES.to_vec(),
            MotorLayout::Eight => EIGHT_MOTOR_TABLE.iter().map(|(name, _)| *name).collect(),
        }
    }
}

impl FromStr for MotorLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "two" | "2" => Ok(MotorLayout::Two),
            "eight" | "8" => Ok(MotorLayout::Eight),
            other => Err(anyhow!("unknown motor layout '{}' (expected two or eight)", other)),
        }
    }
}

impl fmt::Display for MotorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorLayout::Two => write!(f, "two"),
            MotorLayout::Eight => write!(f, "eight"),
        }
    }
}

/// Motor name to intensity in `[0, 100]`. Every stored value is clamped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotorIntensities {
    levels: BTreeMap<String, f32>,
}

impl MotorIntensities {
    pub fn new() -> Self {
        Self::default()
    }

    /// All of `names` at zero.
    pub fn silent<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        let mut out = Self::new();
        for name in names {
            out.set(name, 0.0);
        }
        out
    }

    /// Store a level, clamped to `[0, 100]`. NaN is stored as zero.
    pub fn set(&mut self, name: &str, value: f32) {
        let value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, MAX_INTENSITY)
        };
        self.levels.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.levels.get(name).copied()
    }

    /// Level of `name`, zero when absent.
    pub fn level(&self, name: &str) -> f32 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.levels.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// True when no motor would vibrate.
    pub fn is_silent(&self) -> bool {
        self.levels.values().all(|value| *value <= 0.0)
    }
}

/// Pure mapping from target position to motor intensities for one layout.
#[derive(Clone, Debug)]
pub struct DirectionMapper {
    layout: MotorLayout,
    flat_strength: f32,
    distance_scaled: bool,
}

impl DirectionMapper {
    pub fn new(layout: MotorLayout, flat_strength: f32, distance_scaled: bool) -> Self {
        Self {
            layout,
            flat_strength: flat_strength.clamp(0.0, MAX_INTENSITY),
            distance_scaled,
        }
    }

    pub fn layout(&self) -> MotorLayout {
        self.layout
    }

    /// Map a target centre to intensities. `distance_score` is clamped to `[0, 1]`.
    pub fn map(&self, target: Point, geometry: &FrameGeometry, distance_score: f32) -> MotorIntensities {
        let closeness = if distance_score.is_nan() {
            0.0
        } else {
            distance_score.clamp(0.0, 1.0)
        };
        match self.layout {
            MotorLayout::Two => {
                let (left, right) = two_motor(horizontal_offset(target, geometry), closeness);
                let mut out = MotorIntensities::new();
                out.set("left", left);
                out.set("right", right);
                out
            }
            MotorLayout::Eight => {
                let chosen = nearest_motor(bearing_degrees(target, geometry.center));
                let strength = if self.distance_scaled {
                    self.flat_strength * closeness
                } else {
                    self.flat_strength
                };
                let mut out = MotorIntensities::silent(self.layout.motor_names());
                out.set(chosen, round_tenth(strength));
                out
            }
        }
    }
}

/// Horizontal offset of `target` from the frame centre, normalised to `[-1, 1]`.
pub fn horizontal_offset(target: Point, geometry: &FrameGeometry) -> f32 {
    let half = geometry.width / 2.0;
    if half <= 0.0 {
        return 0.0;
    }
    let offset = (target.x - geometry.center.x) / half;
    if offset.is_nan() {
        0.0
    } else {
        offset.clamp(-1.0, 1.0)
    }
}

/// Left and right intensities for a normalised offset and closeness.
pub fn two_motor(offset: f32, closeness: f32) -> (f32, f32) {
    let offset = offset.clamp(-1.0, 1.0);
    let base = closeness.clamp(0.0, 1.0) * MAX_INTENSITY;
    let (left, right) = if offset < -CENTER_DEADBAND {
        (base, base * (1.0 + offset))
    } else if offset > CENTER_DEADBAND {
        (base * (1.0 - offset), base)
    } else {
        (base, base)
    };
    (finish(left), finish(right))
}

/// Bearing from `center` to `target` in degrees, `(-180, 180]`, 0° toward +x.
/// A target exactly at the centre has bearing 0.
pub fn bearing_degrees(target: Point, center: Point) -> f32 {
    let dx = target.x - center.x;
    let dy = target.y - center.y;
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    dy.atan2(dx).to_degrees()
}

/// Motor in `EIGHT_MOTOR_TABLE` with the smallest wrapped angular difference to
/// `angle`. Ties go to the earlier table entry.
pub fn nearest_motor(angle: f32) -> &'static str {
    let mut best = EIGHT_MOTOR_TABLE[0];
    let mut best_diff = f32::INFINITY;
    for entry in EIGHT_MOTOR_TABLE {
        let diff = angular_difference(angle, entry.1);
        if diff < best_diff {
            best = entry;
            best_diff = diff;
        }
    }
    best.0
}

fn angular_difference(a: f32, b: f32) -> f32 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

fn finish(value: f32) -> f32 {
    let value = value.clamp(0.0, MAX_INTENSITY);
    let floored = if value > FLOOR_THRESHOLD {
        value.max(FLOOR_INTENSITY)
    } else {
        value
    };
    round_tenth(floored)
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
