use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::acquisition::ExitTimeoutAction;
use crate::direction::{MotorLayout, MAX_INTENSITY};

const DEFAULT_CAMERA_SOURCE: &str = "stub://scene";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_MAX_READ_FAILURES: u32 = 5;
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_STUB_CLASS: &str = "bottle";
const DEFAULT_PRIORITY_OBJECTS: &[&str] = &[
    "chair", "couch", "bed", "dining table", "door", "stairs", "shelf",
    "refrigerator", "microwave", "oven", "sink", "bottle", "cup", "bowl",
    "apple", "banana", "orange", "broccoli", "carrot",
    "knife", "spoon", "fork", "plate", "glass",
    "person", "can", "box", "bag", "laptop", "phone", "book",
];
const DEFAULT_TWO_MOTOR_PINS: &[(&str, u8)] = &[("left", 22), ("right", 26)];
const DEFAULT_EIGHT_MOTOR_PINS: &[(&str, u8)] = &[
    ("front", 17),
    ("front_right", 18),
    ("right", 22),
    ("back_right", 23),
    ("back", 24),
    ("back_left", 25),
    ("left", 26),
    ("front_left", 27),
];
const DEFAULT_FLAT_STRENGTH: f32 = 50.0;
const DEFAULT_PULSE_MS: u64 = 250;
const DEFAULT_MIN_INTERVAL_MS: u64 = 300;
const DEFAULT_NO_TARGET_GRACE_MS: u64 = 500;
const DEFAULT_PWM_FREQUENCY_HZ: f64 = 1000.0;
const DEFAULT_BUTTON_PIN: u8 = 5;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_COOLDOWN_MS: u64 = 500;
const DEFAULT_LISTEN_SECS: u64 = 3;
const DEFAULT_EXIT_TIMEOUT_MS: u64 = 3000;
const DEFAULT_DASHBOARD_QUEUE: usize = 32;
const DEFAULT_DASHBOARD_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GuideConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    haptic: Option<HapticConfigFile>,
    button: Option<ButtonConfigFile>,
    speech: Option<SpeechConfigFile>,
    announce: Option<AnnounceConfigFile>,
    acquisition: Option<AcquisitionConfigFile>,
    dashboard: Option<DashboardConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    max_read_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    priority_objects: Option<Vec<String>>,
    stub_class: Option<String>,
    fallback_to_stub: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct HapticConfigFile {
    layout: Option<String>,
    backend: Option<String>,
    motors: Option<Vec<MotorPinFile>>,
    flat_strength: Option<f32>,
    distance_scaled: Option<bool>,
    pulse_ms: Option<u64>,
    min_interval_ms: Option<u64>,
    no_target_grace_ms: Option<u64>,
    pwm_frequency_hz: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MotorPinFile {
    name: String,
    pin: u8,
}

#[derive(Debug, Deserialize, Default)]
struct ButtonConfigFile {
    backend: Option<String>,
    pin: Option<u8>,
    debounce_ms: Option<u64>,
    cooldown_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    command: Option<String>,
    listen_secs: Option<u64>,
    required: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnounceConfigFile {
    command: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AcquisitionConfigFile {
    exit_timeout_ms: Option<u64>,
    on_exit_timeout: Option<String>,
    auto_start: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DashboardConfigFile {
    url: Option<String>,
    queue_capacity: Option<usize>,
    timeout_ms: Option<u64>,
}

/// Complete runtime configuration. Loaded once at startup and not changed after.
#[derive(Debug, Clone)]
pub struct GuideConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub haptic: HapticSettings,
    pub button: ButtonSettings,
    pub speech: SpeechSettings,
    pub announce: AnnounceSettings,
    pub acquisition: AcquisitionSettings,
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://<name>` or a V4L2 device path.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Consecutive failed reads before the acquisition cycle is aborted.
    pub max_read_failures: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub priority_objects: Vec<String>,
    pub stub_class: String,
    pub fallback_to_stub: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorBackendKind {
    Simulated,
    Gpio,
}

impl FromStr for MotorBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(MotorBackendKind::Simulated),
            "gpio" => Ok(MotorBackendKind::Gpio),
            other => Err(anyhow!("unknown motor backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorPin {
    pub name: String,
    pub pin: u8,
}

#[derive(Debug, Clone)]
pub struct HapticSettings {
    pub layout: MotorLayout,
    pub backend: MotorBackendKind,
    /// Motor name to BCM pin, in table order.
    pub motors: Vec<MotorPin>,
    pub flat_strength: f32,
    pub distance_scaled: bool,
    /// Vibration length per actuation; `None` holds until the next command.
    pub pulse: Option<Duration>,
    pub min_interval: Duration,
    pub no_target_grace: Duration,
    pub pwm_frequency_hz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonBackendKind {
    Stdin,
    Gpio,
    Disabled,
}

impl FromStr for ButtonBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdin" | "keyboard" => Ok(ButtonBackendKind::Stdin),
            "gpio" => Ok(ButtonBackendKind::Gpio),
            "disabled" | "none" => Ok(ButtonBackendKind::Disabled),
            other => Err(anyhow!("unknown button backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ButtonSettings {
    pub backend: ButtonBackendKind,
    pub pin: u8,
    pub debounce: Duration,
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// Recognizer command line; `None` means speech is unavailable.
    pub command: Option<String>,
    pub listen: Duration,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct AnnounceSettings {
    pub command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub exit_timeout: Duration,
    pub on_exit_timeout: ExitTimeoutAction,
    pub auto_start: bool,
}

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub url: Option<String>,
    pub queue_capacity: usize,
    pub timeout: Duration,
}

impl GuideConfig {
    /// Load from the file named by `GUIDE_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GUIDE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => GuideConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Built-in defaults, without consulting files or the environment.
    pub fn defaults() -> Self {
        Self {
            camera: CameraSettings {
                source: DEFAULT_CAMERA_SOURCE.to_string(),
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
                fps: DEFAULT_CAMERA_FPS,
                max_read_failures: DEFAULT_MAX_READ_FAILURES,
            },
            detector: DetectorSettings {
                backend: DEFAULT_DETECTOR_BACKEND.to_string(),
                model_path: None,
                labels_path: None,
                input_size: DEFAULT_INPUT_SIZE,
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                priority_objects: DEFAULT_PRIORITY_OBJECTS
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
                stub_class: DEFAULT_STUB_CLASS.to_string(),
                fallback_to_stub: false,
            },
            haptic: HapticSettings {
                layout: MotorLayout::Two,
                backend: MotorBackendKind::Simulated,
                motors: default_motor_pins(MotorLayout::Two),
                flat_strength: DEFAULT_FLAT_STRENGTH,
                distance_scaled: false,
                pulse: pulse_from_ms(DEFAULT_PULSE_MS),
                min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
                no_target_grace: Duration::from_millis(DEFAULT_NO_TARGET_GRACE_MS),
                pwm_frequency_hz: DEFAULT_PWM_FREQUENCY_HZ,
            },
            button: ButtonSettings {
                backend: ButtonBackendKind::Stdin,
                pin: DEFAULT_BUTTON_PIN,
                debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
                cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            },
            speech: SpeechSettings {
                command: None,
                listen: Duration::from_secs(DEFAULT_LISTEN_SECS),
                required: false,
            },
            announce: AnnounceSettings { command: None },
            acquisition: AcquisitionSettings {
                exit_timeout: Duration::from_millis(DEFAULT_EXIT_TIMEOUT_MS),
                on_exit_timeout: ExitTimeoutAction::Resume,
                auto_start: false,
            },
            dashboard: DashboardSettings {
                url: None,
                queue_capacity: DEFAULT_DASHBOARD_QUEUE,
                timeout: Duration::from_millis(DEFAULT_DASHBOARD_TIMEOUT_MS),
            },
        }
    }

    fn from_file(file: GuideConfigFile) -> Result<Self> {
        let mut cfg = Self::defaults();

        if let Some(camera) = file.camera {
            let c = &mut cfg.camera;
            c.source = camera.source.unwrap_or_else(|| c.source.clone());
            c.width = camera.width.unwrap_or(c.width);
            c.height = camera.height.unwrap_or(c.height);
            c.fps = camera.fps.unwrap_or(c.fps);
            c.max_read_failures = camera.max_read_failures.unwrap_or(c.max_read_failures);
        }

        if let Some(detector) = file.detector {
            let d = &mut cfg.detector;
            d.backend = detector.backend.unwrap_or_else(|| d.backend.clone());
            d.model_path = detector.model_path;
            d.labels_path = detector.labels_path;
            d.input_size = detector.input_size.unwrap_or(d.input_size);
            d.confidence_threshold = detector
                .confidence_threshold
                .unwrap_or(d.confidence_threshold);
            if let Some(priority) = detector.priority_objects {
                d.priority_objects = priority;
            }
            d.stub_class = detector.stub_class.unwrap_or_else(|| d.stub_class.clone());
            d.fallback_to_stub = detector.fallback_to_stub.unwrap_or(d.fallback_to_stub);
        }

        if let Some(haptic) = file.haptic {
            if let Some(layout) = haptic.layout.as_deref() {
                cfg.set_layout(layout.parse()?);
            }
            let h = &mut cfg.haptic;
            if let Some(backend) = haptic.backend.as_deref() {
                h.backend = backend.parse()?;
            }
            if let Some(motors) = haptic.motors {
                h.motors = motors
                    .into_iter()
                    .map(|m| MotorPin {
                        name: m.name.trim().to_lowercase(),
                        pin: m.pin,
                    })
                    .collect();
            }
            h.flat_strength = haptic.flat_strength.unwrap_or(h.flat_strength);
            h.distance_scaled = haptic.distance_scaled.unwrap_or(h.distance_scaled);
            if let Some(pulse_ms) = haptic.pulse_ms {
                h.pulse = pulse_from_ms(pulse_ms);
            }
            if let Some(ms) = haptic.min_interval_ms {
                h.min_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = haptic.no_target_grace_ms {
                h.no_target_grace = Duration::from_millis(ms);
            }
            h.pwm_frequency_hz = haptic.pwm_frequency_hz.unwrap_or(h.pwm_frequency_hz);
        }

        if let Some(button) = file.button {
            let b = &mut cfg.button;
            if let Some(backend) = button.backend.as_deref() {
                b.backend = backend.parse()?;
            }
            b.pin = button.pin.unwrap_or(b.pin);
            if let Some(ms) = button.debounce_ms {
                b.debounce = Duration::from_millis(ms);
            }
            if let Some(ms) = button.cooldown_ms {
                b.cooldown = Duration::from_millis(ms);
            }
        }

        if let Some(speech) = file.speech {
            let s = &mut cfg.speech;
            s.command = speech.command.filter(|cmd| !cmd.trim().is_empty());
            if let Some(secs) = speech.listen_secs {
                s.listen = Duration::from_secs(secs);
            }
            s.required = speech.required.unwrap_or(s.required);
        }

        if let Some(announce) = file.announce {
            cfg.announce.command = announce.command.filter(|cmd| !cmd.trim().is_empty());
        }

        if let Some(acquisition) = file.acquisition {
            let a = &mut cfg.acquisition;
            if let Some(ms) = acquisition.exit_timeout_ms {
                a.exit_timeout = Duration::from_millis(ms);
            }
            if let Some(action) = acquisition.on_exit_timeout.as_deref() {
                a.on_exit_timeout = action.parse()?;
            }
            a.auto_start = acquisition.auto_start.unwrap_or(a.auto_start);
        }

        if let Some(dashboard) = file.dashboard {
            let d = &mut cfg.dashboard;
            d.url = dashboard.url.filter(|url| !url.trim().is_empty());
            d.queue_capacity = dashboard.queue_capacity.unwrap_or(d.queue_capacity);
            if let Some(ms) = dashboard.timeout_ms {
                d.timeout = Duration::from_millis(ms);
            }
        }

        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_value("GUIDE_CAMERA_SOURCE") {
            self.camera.source = source;
        }
        if let Some(backend) = env_value("GUIDE_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(layout) = env_value("GUIDE_MOTOR_LAYOUT") {
            let layout = layout
                .parse()
                .map_err(|e| anyhow!("GUIDE_MOTOR_LAYOUT: {}", e))?;
            self.set_layout(layout);
        }
        if let Some(backend) = env_value("GUIDE_MOTOR_BACKEND") {
            self.haptic.backend = backend
                .parse()
                .map_err(|e| anyhow!("GUIDE_MOTOR_BACKEND: {}", e))?;
        }
        if let Some(backend) = env_value("GUIDE_BUTTON_BACKEND") {
            self.button.backend = backend
                .parse()
                .map_err(|e| anyhow!("GUIDE_BUTTON_BACKEND: {}", e))?;
        }
        if let Some(command) = env_value("GUIDE_SPEECH_COMMAND") {
            self.speech.command = Some(command);
        }
        if let Some(url) = env_value("GUIDE_DASHBOARD_URL") {
            self.dashboard.url = Some(url);
        }
        if let Ok(objects) = std::env::var("GUIDE_PRIORITY_OBJECTS") {
            let parsed = split_csv(&objects);
            if !parsed.is_empty() {
                self.detector.priority_objects = parsed;
            }
        }
        Ok(())
    }

    /// Switch motor layout. A motor table that does not fit the new layout is
    /// replaced by that layout's default pins.
    pub fn set_layout(&mut self, layout: MotorLayout) {
        self.haptic.layout = layout;
        if !motors_match_layout(&self.haptic.motors, layout) {
            self.haptic.motors = default_motor_pins(layout);
        }
    }

    /// Force every hardware-facing collaborator onto its simulated variant.
    pub fn force_simulation(&mut self) {
        if !self.camera.source.starts_with("stub://") {
            self.camera.source = DEFAULT_CAMERA_SOURCE.to_string();
        }
        self.haptic.backend = MotorBackendKind::Simulated;
        if self.button.backend == ButtonBackendKind::Gpio {
            self.button.backend = ButtonBackendKind::Stdin;
        }
    }

    pub fn validate(&mut self) -> Result<()> {
        let camera = &self.camera;
        if camera.source.trim().is_empty() {
            return Err(anyhow!("camera.source must not be empty"));
        }
        if camera.width == 0 || camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if camera.fps == 0 {
            return Err(anyhow!("camera.fps must be greater than zero"));
        }
        if camera.max_read_failures == 0 {
            return Err(anyhow!("camera.max_read_failures must be greater than zero"));
        }

        let detector = &mut self.detector;
        if !(0.0..=1.0).contains(&detector.confidence_threshold) {
            return Err(anyhow!("detector.confidence_threshold must be within [0, 1]"));
        }
        if detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be greater than zero"));
        }
        detector.stub_class = detector.stub_class.trim().to_string();
        if detector.stub_class.is_empty() {
            return Err(anyhow!("detector.stub_class must not be empty"));
        }
        detector.backend = detector.backend.trim().to_ascii_lowercase();

        let haptic = &self.haptic;
        validate_motor_table(&haptic.motors, haptic.layout)?;
        if !(0.0..=MAX_INTENSITY).contains(&haptic.flat_strength) {
            return Err(anyhow!("haptic.flat_strength must be within [0, 100]"));
        }
        if !(haptic.pwm_frequency_hz > 0.0) {
            return Err(anyhow!("haptic.pwm_frequency_hz must be greater than zero"));
        }

        if self.speech.listen.is_zero() {
            return Err(anyhow!("speech.listen_secs must be greater than zero"));
        }
        if self.acquisition.exit_timeout.is_zero() {
            return Err(anyhow!("acquisition.exit_timeout_ms must be greater than zero"));
        }

        let dashboard = &self.dashboard;
        if let Some(url) = dashboard.url.as_deref() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!("dashboard.url must be an http(s) URL, got '{}'", url));
            }
        }
        if dashboard.queue_capacity == 0 {
            return Err(anyhow!("dashboard.queue_capacity must be greater than zero"));
        }
        if dashboard.timeout.is_zero() {
            return Err(anyhow!("dashboard.timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Default pin table for a layout.
pub fn default_motor_pins(layout: MotorLayout) -> Vec<MotorPin> {
    let table = match layout {
        MotorLayout::Two => DEFAULT_TWO_MOTOR_PINS,
        MotorLayout::Eight => DEFAULT_EIGHT_MOTOR_PINS,
    };
    table
        .iter()
        .map(|(name, pin)| MotorPin {
            name: name.to_string(),
            pin: *pin,
        })
        .collect()
}

fn motors_match_layout(motors: &[MotorPin], layout: MotorLayout) -> bool {
    validate_motor_table(motors, layout).is_ok()
}

fn validate_motor_table(motors: &[MotorPin], layout: MotorLayout) -> Result<()> {
    let expected: HashSet<&str> = layout.motor_names().into_iter().collect();
    let mut names = HashSet::new();
    let mut pins = HashSet::new();
    for motor in motors {
        if !expected.contains(motor.name.as_str()) {
            return Err(anyhow!(
                "motor '{}' is not part of the {} layout",
                motor.name,
                layout
            ));
        }
        if !names.insert(motor.name.as_str()) {
            return Err(anyhow!("motor '{}' listed more than once", motor.name));
        }
        if !pins.insert(motor.pin) {
            return Err(anyhow!("pin {} assigned to more than one motor", motor.pin));
        }
    }
    if names.len() != expected.len() {
        return Err(anyhow!(
            "{} layout needs {} motors, got {}",
            layout,
            expected.len(),
            names.len()
        ));
    }
    Ok(())
}

fn pulse_from_ms(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

fn read_config_file(path: &Path) -> Result<GuideConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
