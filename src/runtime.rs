//! The guidance daemon's main loop.
//!
//! Single-threaded and cooperative: each `step` either waits briefly for the button,
//! runs one listen window, or processes one camera frame. Side effects of state
//! changes (camera start/stop, motors off) happen here, in `apply`.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::acquisition::{AcquisitionMachine, AcquisitionState, MachineSettings, Transition};
use crate::config::GuideConfig;
use crate::detect::{open_detector, Detector};
use crate::direction::DirectionMapper;
use crate::guidance::{GuidanceLoop, GuidanceSettings, TickReport};
use crate::haptic::{open_backend, HapticDriver, MotorBackend};
use crate::ingest::{CameraSource, FrameSource};
use crate::input::announce;
use crate::input::{open_announcer, open_button, open_recognizer};
use crate::input::{Announcer, ButtonSource, SpeechRecognizer};
use crate::observer::{open_sink, EventSink};
use crate::shutdown::{ShutdownSignal, Teardown};

/// Longest a single idle or exit-decision step blocks on the button.
const BUTTON_POLL: Duration = Duration::from_millis(100);
/// Pause after a failed frame read before retrying.
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Collaborators the runtime is built from.
pub struct RuntimeParts {
    pub detector: Box<dyn Detector>,
    pub motors: Box<dyn MotorBackend>,
    pub camera: Box<dyn FrameSource>,
    pub button: Box<dyn ButtonSource>,
    pub speech: Option<Box<dyn SpeechRecognizer>>,
    pub announcer: Box<dyn Announcer>,
    pub events: Box<dyn EventSink>,
}

pub struct GuideRuntime {
    machine: AcquisitionMachine,
    guidance: GuidanceLoop,
    camera: Box<dyn FrameSource>,
    button: Box<dyn ButtonSource>,
    speech: Option<Box<dyn SpeechRecognizer>>,
    listen_window: Duration,
    max_read_failures: u32,
    auto_start: bool,
    shutdown: ShutdownSignal,
    teardown: Teardown,
    camera_running: bool,
    read_failures: u32,
    detection_failing: bool,
}

impl GuideRuntime {
    /// Open every collaborator named by `config`.
    ///
    /// Missing motor or button hardware degrades to simulation. A detector or camera
    /// that cannot be constructed is a startup error.
    pub fn from_config(config: &GuideConfig, shutdown: ShutdownSignal) -> Result<Self> {
        let detector = open_detector(&config.detector)?;
        let camera = CameraSource::new(config.camera.clone())?;
        let parts = RuntimeParts {
            detector,
            motors: open_backend(&config.haptic),
            camera: Box::new(camera),
            button: Box::new(open_button(&config.button)?),
            speech: open_recognizer(&config.speech),
            announcer: open_announcer(&config.announce),
            events: open_sink(&config.dashboard),
        };
        Self::assemble(parts, config, shutdown)
    }

    pub fn assemble(parts: RuntimeParts, config: &GuideConfig, shutdown: ShutdownSignal) -> Result<Self> {
        let haptic = &config.haptic;
        let mapper = DirectionMapper::new(haptic.layout, haptic.flat_strength, haptic.distance_scaled);
        let driver = HapticDriver::spawn(parts.motors, haptic.pulse)?;
        log::info!(
            "runtime: {} layout, {} motors, detector {}",
            haptic.layout,
            driver.backend_name(),
            parts.detector.name()
        );
        let guidance = GuidanceLoop::new(
            parts.detector,
            mapper,
            driver,
            parts.events,
            GuidanceSettings::from_config(haptic),
        );

        let speech_available = parts.speech.is_some();
        if !speech_available {
            log::warn!("speech recognition unavailable; guiding to the closest object");
        }
        let machine = AcquisitionMachine::new(
            MachineSettings::from_config(config),
            speech_available,
            parts.announcer,
        );

        Ok(Self {
            machine,
            guidance,
            camera: parts.camera,
            button: parts.button,
            speech: parts.speech,
            listen_window: config.speech.listen,
            max_read_failures: config.camera.max_read_failures,
            auto_start: config.acquisition.auto_start,
            shutdown,
            teardown: Teardown::new(),
            camera_running: false,
            read_failures: 0,
            detection_failing: false,
        })
    }

    pub fn state(&self) -> AcquisitionState {
        self.machine.state()
    }

    pub fn target(&self) -> Option<&str> {
        self.machine.target()
    }

    /// Guide to `name` without asking for it first.
    pub fn preset_target(&mut self, name: &str) {
        self.machine.set_target(Some(name));
    }

    pub fn is_torn_down(&self) -> bool {
        self.teardown.is_done()
    }

    pub fn guidance(&self) -> &GuidanceLoop {
        &self.guidance
    }

    /// Run until shutdown is requested, then tear down.
    pub fn run(&mut self) -> Result<()> {
        self.machine.announce(announce::READY);
        if self.auto_start {
            if let Some(transition) = self.machine.start_continuous() {
                self.apply(transition);
            }
        }
        while !self.shutdown.is_requested() {
            self.step();
        }
        log::info!("shutdown requested");
        self.teardown();
        Ok(())
    }

    /// One unit of work for the current state.
    pub fn step(&mut self) -> Option<TickReport> {
        match self.machine.state() {
            AcquisitionState::Idle => {
                if self.button.wait_for_button(BUTTON_POLL) {
                    self.press(Instant::now());
                }
                None
            }
            AcquisitionState::Listening => {
                self.listen();
                None
            }
            AcquisitionState::Active => {
                if self.button.is_pressed() && self.press(Instant::now()) {
                    return None;
                }
                self.active_tick()
            }
            AcquisitionState::ExitDecision => {
                let remaining = self
                    .machine
                    .exit_remaining(Instant::now())
                    .unwrap_or_default();
                if self.button.wait_for_button(remaining.min(BUTTON_POLL)) {
                    self.press(Instant::now());
                } else if let Some(transition) = self.machine.poll(Instant::now()) {
                    self.apply(transition);
                }
                None
            }
        }
    }

    /// Stop motors, release the camera, release actuators and the button. Runs once.
    pub fn teardown(&mut self) {
        if !self.teardown.begin() {
            return;
        }
        log::info!("teardown: stopping motors");
        self.guidance.halt();
        self.camera.stop();
        self.camera_running = false;
        self.guidance.release_actuators();
        self.button.release();
        log::info!("teardown complete");
    }

    fn press(&mut self, now: Instant) -> bool {
        match self.machine.on_button(now) {
            Some(transition) => {
                self.apply(transition);
                true
            }
            None => false,
        }
    }

    fn listen(&mut self) {
        let Some(recognizer) = self.speech.as_mut() else {
            if let Some(transition) = self.machine.on_speech_failure() {
                self.apply(transition);
            }
            return;
        };

        let transition = match recognizer.listen(self.listen_window) {
            Ok(transcript) => {
                while self.button.is_pressed() {}
                log::info!("heard: {:?}", transcript);
                self.machine.on_transcript(transcript, Instant::now())
            }
            Err(err) => {
                log::warn!("speech recognizer failed, disabling speech: {:#}", err);
                self.speech = None;
                self.machine.on_speech_failure()
            }
        };
        if let Some(transition) = transition {
            self.apply(transition);
        }
    }

    fn active_tick(&mut self) -> Option<TickReport> {
        let frame = match self.camera.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.read_failures += 1;
                log::warn!(
                    "frame read failed ({}/{}): {:#}",
                    self.read_failures,
                    self.max_read_failures,
                    err
                );
                if self.read_failures >= self.max_read_failures {
                    log::error!("camera failed {} times in a row, aborting cycle", self.read_failures);
                    if let Some(transition) = self.machine.abort(announce::CAMERA_FAILED) {
                        self.apply(transition);
                    }
                } else {
                    std::thread::sleep(READ_RETRY_DELAY);
                }
                return None;
            }
        };
        self.read_failures = 0;

        let report = self.guidance.tick(
            self.machine.state(),
            self.machine.target(),
            &frame,
            Instant::now(),
        );
        if report.detector_failed {
            if !self.detection_failing {
                self.detection_failing = true;
                self.machine.announce(announce::DETECTION_ERROR);
            }
        } else {
            self.detection_failing = false;
        }
        Some(report)
    }

    fn apply(&mut self, transition: Transition) {
        match transition.to {
            AcquisitionState::Active => {
                if !self.camera_running {
                    if let Err(err) = self.camera.start() {
                        log::error!("camera failed to start: {:#}", err);
                        if let Some(abort) = self.machine.abort(announce::CAMERA_FAILED) {
                            self.apply(abort);
                        }
                        return;
                    }
                    self.camera_running = true;
                }
                self.read_failures = 0;
                self.detection_failing = false;
                self.guidance.begin_cycle(Instant::now());
            }
            AcquisitionState::ExitDecision => self.guidance.halt(),
            AcquisitionState::Idle => {
                self.guidance.halt();
                if self.camera_running {
                    self.camera.stop();
                    self.camera_running = false;
                }
            }
            AcquisitionState::Listening => {}
        }
    }
}

impl Drop for GuideRuntime {
    fn drop(&mut self) {
        self.teardown();
    }
}
