#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use haptic_guide::input::Announcer;
use haptic_guide::{
    DashboardEvent, Detection, Detector, EventSink, Frame, FrameSource, MotorBackend,
    MotorIntensities,
};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

/// Square detection of side `2 * half` centred on (`cx`, `cy`).
pub fn detection(class: &str, cx: f32, cy: f32, half: f32, confidence: f32) -> Detection {
    Detection::new([cx - half, cy - half, cx + half, cy + half], class, confidence)
}

pub fn frame(sequence: u64) -> Frame {
    Frame::blank(WIDTH, HEIGHT, sequence).expect("blank frame")
}

/// Detector whose output is whatever the test last put in the shared scene.
pub struct SceneDetector {
    scene: Arc<Mutex<Option<Vec<Detection>>>>,
}

/// Handle for changing what `SceneDetector` sees. `None` makes detection fail.
#[derive(Clone, Default)]
pub struct Scene(Arc<Mutex<Option<Vec<Detection>>>>);

impl Scene {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self(Arc::new(Mutex::new(Some(detections))))
    }

    pub fn show(&self, detections: Vec<Detection>) {
        *self.0.lock().unwrap() = Some(detections);
    }

    pub fn clear(&self) {
        self.show(Vec::new());
    }

    pub fn break_detector(&self) {
        *self.0.lock().unwrap() = None;
    }

    pub fn detector(&self) -> Box<dyn Detector> {
        Box::new(SceneDetector {
            scene: self.0.clone(),
        })
    }
}

impl Detector for SceneDetector {
    fn name(&self) -> &'static str {
        "scene"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.scene
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("inference failed"))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MotorCall {
    Set(MotorIntensities),
    Off,
    Release,
}

/// Motor backend that records every call.
#[derive(Clone, Default)]
pub struct RecordingMotors {
    pub calls: Arc<Mutex<Vec<MotorCall>>>,
}

impl RecordingMotors {
    pub fn calls(&self) -> Vec<MotorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sets(&self) -> Vec<MotorIntensities> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MotorCall::Set(levels) => Some(levels),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &MotorCall) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    pub fn boxed(&self) -> Box<dyn MotorBackend> {
        Box::new(self.clone())
    }
}

impl MotorBackend for RecordingMotors {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn set_intensities(&mut self, intensities: &MotorIntensities) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(MotorCall::Set(intensities.clone()));
        Ok(())
    }

    fn off(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(MotorCall::Off);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(MotorCall::Release);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CameraLog {
    pub starts: u32,
    pub stops: u32,
    pub frames: u64,
}

/// In-memory camera. Frames are produced immediately, without pacing.
#[derive(Clone, Default)]
pub struct FakeCamera {
    pub log: Arc<Mutex<CameraLog>>,
    pub fail_start: bool,
    pub fail_reads: bool,
    running: bool,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> u32 {
        self.log.lock().unwrap().starts
    }

    pub fn stops(&self) -> u32 {
        self.log.lock().unwrap().stops
    }
}

impl FrameSource for FakeCamera {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(anyhow!("no such device"));
        }
        self.running = true;
        self.log.lock().unwrap().starts += 1;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.running {
            return Err(anyhow!("camera not started"));
        }
        if self.fail_reads {
            return Err(anyhow!("read timed out"));
        }
        let mut log = self.log.lock().unwrap();
        log.frames += 1;
        Frame::blank(WIDTH, HEIGHT, log.frames)
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.log.lock().unwrap().stops += 1;
        }
    }
}

/// Announcer that keeps every phrase.
#[derive(Clone, Default)]
pub struct RecordingAnnouncer {
    pub spoken: Arc<Mutex<Vec<String>>>,
}

impl RecordingAnnouncer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn boxed(&self) -> Box<dyn Announcer> {
        Box::new(self.clone())
    }
}

impl Announcer for RecordingAnnouncer {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Event sink that keeps every dashboard event.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<DashboardEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DashboardEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn boxed(&self) -> Box<dyn EventSink> {
        Box::new(self.clone())
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: DashboardEvent) {
        self.events.lock().unwrap().push(event);
    }
}
