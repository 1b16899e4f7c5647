//! Per-frame guidance: detect, select, map, actuate.
//!
//! One `tick` per captured frame, strictly in that order. Mapping is recomputed on
//! every tick; only the actuation call is rate limited.

use std::time::{Duration, Instant};

use crate::acquisition::AcquisitionState;
use crate::config::HapticSettings;
use crate::detect::Detector;
use crate::direction::{DirectionMapper, MotorIntensities};
use crate::frame::{Frame, FrameGeometry};
use crate::haptic::HapticDriver;
use crate::observer::{DashboardEvent, EventSink, MotorEvent};
use crate::select::{select_target, Target};

#[derive(Clone, Debug)]
pub struct GuidanceSettings {
    /// Minimum spacing between actuations for the same target.
    pub min_haptic_interval: Duration,
    /// How long a target may be missing before the motors are stopped.
    pub no_target_grace: Duration,
}

impl GuidanceSettings {
    pub fn from_config(haptic: &HapticSettings) -> Self {
        Self {
            min_haptic_interval: haptic.min_interval,
            no_target_grace: haptic.no_target_grace,
        }
    }
}

impl Default for GuidanceSettings {
    fn default() -> Self {
        Self {
            min_haptic_interval: Duration::from_millis(300),
            no_target_grace: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Guidance is not running in the current state.
    Skipped,
    Guided {
        target: Target,
        intensities: MotorIntensities,
        /// False when the rate limiter held the actuation back.
        actuated: bool,
    },
    NoTarget {
        /// This tick stopped the motors.
        motors_stopped: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub detections: usize,
    pub detector_failed: bool,
    pub outcome: TickOutcome,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            detections: 0,
            detector_failed: false,
            outcome: TickOutcome::Skipped,
        }
    }
}

pub struct GuidanceLoop {
    detector: Box<dyn Detector>,
    mapper: DirectionMapper,
    driver: HapticDriver,
    events: Box<dyn EventSink>,
    settings: GuidanceSettings,
    /// Lower-cased class and time of the last actuation.
    last_actuation: Option<(String, Instant)>,
    last_seen: Option<Instant>,
    motors_idle: bool,
}

impl GuidanceLoop {
    pub fn new(
        detector: Box<dyn Detector>,
        mapper: DirectionMapper,
        driver: HapticDriver,
        events: Box<dyn EventSink>,
        settings: GuidanceSettings,
    ) -> Self {
        Self {
            detector,
            mapper,
            driver,
            events,
            settings,
            last_actuation: None,
            last_seen: None,
            motors_idle: true,
        }
    }

    pub fn driver(&self) -> &HapticDriver {
        &self.driver
    }

    /// Reset per-cycle bookkeeping when guidance (re)starts.
    pub fn begin_cycle(&mut self, now: Instant) {
        self.last_actuation = None;
        self.last_seen = Some(now);
        self.motors_idle = false;
    }

    pub fn tick(
        &mut self,
        state: AcquisitionState,
        target_name: Option<&str>,
        frame: &Frame,
        now: Instant,
    ) -> TickReport {
        if state != AcquisitionState::Active {
            return TickReport::skipped();
        }

        let (detections, detector_failed) = match self.detector.detect(frame) {
            Ok(detections) => (detections, false),
            Err(err) => {
                log::warn!("detector {} failed on frame {}: {:#}", self.detector.name(), frame.sequence, err);
                (Vec::new(), true)
            }
        };

        let geometry = frame.geometry();
        let outcome = match select_target(&detections, &geometry, target_name) {
            Some(target) => self.guide(target, &geometry, now),
            None => self.no_target(target_name, now),
        };

        TickReport {
            detections: detections.len(),
            detector_failed,
            outcome,
        }
    }

    /// Stop the motors now and tell the dashboard.
    pub fn halt(&mut self) {
        if let Err(err) = self.driver.off() {
            log::warn!("failed to stop motors: {:#}", err);
        }
        self.motors_idle = true;
        self.last_actuation = None;
        self.events.emit(DashboardEvent::Stop);
    }

    /// Give up the motor hardware. Nothing can be actuated afterwards.
    pub fn release_actuators(&mut self) {
        self.driver.shutdown();
    }

    fn guide(
        &mut self,
        target: Target,
        geometry: &FrameGeometry,
        now: Instant,
    ) -> TickOutcome {
        let intensities = self
            .mapper
            .map(target.detection.center, geometry, target.distance_score);
        self.last_seen = Some(now);
        self.motors_idle = false;

        let class = target.class_name().to_lowercase();
        let held_back = match &self.last_actuation {
            Some((last_class, at)) => {
                *last_class == class
                    && now.saturating_duration_since(*at) < self.settings.min_haptic_interval
            }
            None => false,
        };

        if held_back {
            log::debug!("rate limited actuation for {}", class);
            return TickOutcome::Guided {
                target,
                intensities,
                actuated: false,
            };
        }

        log::debug!(
            "guiding to {} (score {:.1}, closeness {:.2})",
            target.class_name(),
            target.score,
            target.distance_score
        );
        if let Err(err) = self.driver.actuate(&intensities) {
            log::warn!("actuation failed: {:#}", err);
        }
        self.events.emit(DashboardEvent::Update(MotorEvent::from_intensities(
            &intensities,
            Some(target.class_name()),
        )));
        self.last_actuation = Some((class, now));
        TickOutcome::Guided {
            target,
            intensities,
            actuated: true,
        }
    }

    fn no_target(&mut self, target_name: Option<&str>, now: Instant) -> TickOutcome {
        if self.motors_idle {
            return TickOutcome::NoTarget {
                motors_stopped: false,
            };
        }
        let last_seen = *self.last_seen.get_or_insert(now);
        if now.saturating_duration_since(last_seen) < self.settings.no_target_grace {
            return TickOutcome::NoTarget {
                motors_stopped: false,
            };
        }

        log::debug!("no target for {:?}, stopping motors", self.settings.no_target_grace);
        if let Err(err) = self.driver.off() {
            log::warn!("failed to stop motors: {:#}", err);
        }
        self.motors_idle = true;
        self.last_actuation = None;
        let event = match target_name {
            Some(name) => DashboardEvent::Update(MotorEvent::searching(name)),
            None => DashboardEvent::Stop,
        };
        self.events.emit(event);
        TickOutcome::NoTarget {
            motors_stopped: true,
        }
    }
}
