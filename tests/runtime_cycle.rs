mod common;

use anyhow::{anyhow, Result};
use std::thread;
use std::time::Duration;

use common::{
    detection, FakeCamera, MotorCall, RecordingAnnouncer, RecordingMotors, RecordingSink, Scene,
};
use haptic_guide::input::announce;
use haptic_guide::input::{ButtonInput, ButtonLatch, ScriptedRecognizer, SpeechRecognizer};
use haptic_guide::{
    AcquisitionState, DashboardEvent, GuideConfig, GuideRuntime, RuntimeParts, ShutdownSignal,
    TickOutcome,
};

struct Harness {
    runtime: GuideRuntime,
    latch: ButtonLatch,
    motors: RecordingMotors,
    camera: FakeCamera,
    spoken: RecordingAnnouncer,
    events: RecordingSink,
}

fn config() -> GuideConfig {
    let mut config = GuideConfig::defaults();
    config.button.cooldown = Duration::ZERO;
    config.haptic.pulse = None;
    config.camera.max_read_failures = 3;
    config
}

fn harness(
    config: &GuideConfig,
    scene: &Scene,
    camera: FakeCamera,
    speech: Option<Box<dyn SpeechRecognizer>>,
    shutdown: ShutdownSignal,
) -> Harness {
    let latch = ButtonLatch::new();
    let motors = RecordingMotors::default();
    let spoken = RecordingAnnouncer::default();
    let events = RecordingSink::default();
    let parts = RuntimeParts {
        detector: scene.detector(),
        motors: motors.boxed(),
        camera: Box::new(camera.clone()),
        button: Box::new(ButtonInput::from_latch(latch.clone())),
        speech,
        announcer: spoken.boxed(),
        events: events.boxed(),
    };
    let runtime = GuideRuntime::assemble(parts, config, shutdown).expect("assemble runtime");
    Harness {
        runtime,
        latch,
        motors,
        camera,
        spoken,
        events,
    }
}

fn press_and_step(h: &mut Harness) {
    h.latch.signal();
    h.runtime.step();
}

struct BrokenRecognizer;

impl SpeechRecognizer for BrokenRecognizer {
    fn listen(&mut self, _duration: Duration) -> Result<Option<String>> {
        Err(anyhow!("microphone disconnected"))
    }
}

#[test]
fn press_speak_guide_and_confirm_exit() {
    let scene = Scene::new(vec![
        detection("cup", 320.0, 240.0, 50.0, 0.9),
        detection("bottle", 520.0, 260.0, 40.0, 0.6),
    ]);
    let speech: Box<dyn SpeechRecognizer> = Box::new(ScriptedRecognizer::new(["Bottle"]));
    let mut h = harness(&config(), &scene, FakeCamera::new(), Some(speech), ShutdownSignal::new());

    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::Listening);
    assert_eq!(h.camera.starts(), 0);

    h.runtime.step();
    assert_eq!(h.runtime.state(), AcquisitionState::Active);
    assert_eq!(h.runtime.target(), Some("bottle"));
    assert_eq!(h.camera.starts(), 1);

    let report = h.runtime.step().expect("active tick");
    match report.outcome {
        TickOutcome::Guided { target, actuated, .. } => {
            assert_eq!(target.class_name(), "bottle");
            assert!(actuated);
        }
        other => panic!("expected guidance, got {:?}", other),
    }

    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::ExitDecision);
    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::Idle);
    assert_eq!(h.camera.stops(), 1);

    h.runtime.guidance().driver().flush().unwrap();
    let sets = h.motors.sets();
    assert_eq!(sets.len(), 1);
    assert!(sets[0].level("right") > sets[0].level("left"));
    assert_eq!(h.motors.calls().last(), Some(&MotorCall::Off));
    assert_eq!(h.events.events().last(), Some(&DashboardEvent::Stop));
    assert_eq!(
        h.spoken.spoken(),
        vec![
            announce::LISTENING.to_string(),
            announce::searching_for("bottle"),
            announce::PRESS_AGAIN.to_string(),
            announce::STOPPED.to_string(),
        ]
    );

    drop(h.runtime);
    assert_eq!(h.motors.count(&MotorCall::Release), 1);
}

#[test]
fn repeated_read_failures_end_the_cycle() {
    let scene = Scene::new(Vec::new());
    let mut h = harness(
        &config(),
        &scene,
        FakeCamera::failing_reads(),
        None,
        ShutdownSignal::new(),
    );

    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::Active);

    assert!(h.runtime.step().is_none());
    assert!(h.runtime.step().is_none());
    assert_eq!(h.runtime.state(), AcquisitionState::Active);
    assert!(h.runtime.step().is_none());
    assert_eq!(h.runtime.state(), AcquisitionState::Idle);

    assert_eq!(h.camera.stops(), 1);
    assert_eq!(
        h.spoken.spoken().last().map(String::as_str),
        Some(announce::CAMERA_FAILED)
    );
}

#[test]
fn camera_that_cannot_start_returns_to_idle() {
    let scene = Scene::new(Vec::new());
    let mut h = harness(
        &config(),
        &scene,
        FakeCamera::failing_start(),
        None,
        ShutdownSignal::new(),
    );

    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::Idle);
    assert!(h.spoken.spoken().contains(&announce::CAMERA_FAILED.to_string()));
}

#[test]
fn detector_errors_are_announced_once_and_guidance_continues() {
    let scene = Scene::default();
    let mut h = harness(&config(), &scene, FakeCamera::new(), None, ShutdownSignal::new());

    press_and_step(&mut h);
    for _ in 0..4 {
        let report = h.runtime.step().expect("active tick");
        assert!(report.detector_failed);
    }
    assert_eq!(h.runtime.state(), AcquisitionState::Active);

    scene.show(vec![detection("bottle", 320.0, 240.0, 40.0, 0.8)]);
    let report = h.runtime.step().expect("active tick");
    assert!(!report.detector_failed);
    assert!(matches!(report.outcome, TickOutcome::Guided { .. }));

    let errors = h
        .spoken
        .spoken()
        .iter()
        .filter(|text| text.as_str() == announce::DETECTION_ERROR)
        .count();
    assert_eq!(errors, 1);
}

#[test]
fn recognizer_failure_falls_through_to_guidance() {
    let scene = Scene::new(Vec::new());
    let speech: Box<dyn SpeechRecognizer> = Box::new(BrokenRecognizer);
    let mut h = harness(&config(), &scene, FakeCamera::new(), Some(speech), ShutdownSignal::new());

    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::Listening);
    h.runtime.step();
    assert_eq!(h.runtime.state(), AcquisitionState::Active);
    assert!(h.spoken.spoken().contains(&announce::SPEECH_UNAVAILABLE.to_string()));

    press_and_step(&mut h);
    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::Idle);
    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::Active);
}

#[test]
fn unconfirmed_exit_resumes_through_the_runtime() {
    let mut config = config();
    config.acquisition.exit_timeout = Duration::from_millis(150);
    let scene = Scene::new(vec![detection("bottle", 320.0, 240.0, 40.0, 0.8)]);
    let mut h = harness(&config, &scene, FakeCamera::new(), None, ShutdownSignal::new());

    press_and_step(&mut h);
    press_and_step(&mut h);
    assert_eq!(h.runtime.state(), AcquisitionState::ExitDecision);

    for _ in 0..10 {
        h.runtime.step();
        if h.runtime.state() != AcquisitionState::ExitDecision {
            break;
        }
    }
    assert_eq!(h.runtime.state(), AcquisitionState::Active);
    assert_eq!(h.camera.starts(), 1);
    assert_eq!(h.camera.stops(), 0);
}

#[test]
fn run_auto_starts_and_tears_down_once_on_shutdown() {
    let mut config = config();
    config.acquisition.auto_start = true;
    let scene = Scene::new(vec![detection("bottle", 400.0, 240.0, 40.0, 0.8)]);
    let shutdown = ShutdownSignal::new();
    let mut h = harness(&config, &scene, FakeCamera::new(), None, shutdown.clone());
    h.runtime.preset_target("Bottle");

    let stopper = {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            shutdown.request();
        })
    };
    h.runtime.run().expect("run");
    stopper.join().unwrap();

    assert!(h.runtime.is_torn_down());
    assert_eq!(h.runtime.state(), AcquisitionState::Active);
    assert_eq!(h.camera.starts(), 1);
    assert_eq!(h.camera.stops(), 1);
    assert!(!h.motors.sets().is_empty());
    assert_eq!(
        h.spoken.spoken()[..2],
        [
            announce::READY.to_string(),
            announce::searching_for("bottle")
        ]
    );

    h.runtime.teardown();
    drop(h.runtime);
    assert_eq!(h.motors.count(&MotorCall::Release), 1);
    assert_eq!(h.motors.calls().iter().rev().nth(1), Some(&MotorCall::Off));
}
