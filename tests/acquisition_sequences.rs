mod common;

use std::time::{Duration, Instant};

use common::RecordingAnnouncer;
use haptic_guide::input::announce;
use haptic_guide::{AcquisitionMachine, AcquisitionState, ExitTimeoutAction, MachineSettings};

use AcquisitionState::{Active, ExitDecision, Idle, Listening};

enum Input {
    Press,
    Heard(&'static str),
    Silence,
    Poll,
}

fn settings(on_exit_timeout: ExitTimeoutAction) -> MachineSettings {
    MachineSettings {
        exit_timeout: Duration::from_secs(3),
        on_exit_timeout,
        cooldown: Duration::from_millis(500),
        speech_required: false,
    }
}

/// Feed `(seconds, input)` pairs and collect the state after each one.
fn replay(
    machine: &mut AcquisitionMachine,
    t0: Instant,
    script: &[(f32, Input)],
) -> Vec<AcquisitionState> {
    script
        .iter()
        .map(|(at, input)| {
            let now = t0 + Duration::from_secs_f32(*at);
            match input {
                Input::Press => machine.on_button(now),
                Input::Heard(text) => machine.on_transcript(Some(text.to_string()), now),
                Input::Silence => machine.on_transcript(None, now),
                Input::Poll => machine.poll(now),
            };
            machine.state()
        })
        .collect()
}

#[test]
fn full_cycle_with_confirmed_exit() {
    let spoken = RecordingAnnouncer::default();
    let mut machine = AcquisitionMachine::new(settings(ExitTimeoutAction::Resume), true, spoken.boxed());
    let t0 = Instant::now();

    let states = replay(
        &mut machine,
        t0,
        &[
            (0.0, Input::Press),
            (3.0, Input::Heard("Water Bottle")),
            (10.0, Input::Poll),
            (10.0, Input::Press),
            (11.0, Input::Press),
        ],
    );
    assert_eq!(states, vec![Listening, Active, Active, ExitDecision, Idle]);
    assert_eq!(machine.target(), Some("water bottle"));
    assert_eq!(
        spoken.spoken(),
        vec![
            announce::LISTENING.to_string(),
            announce::searching_for("water bottle"),
            announce::PRESS_AGAIN.to_string(),
            announce::STOPPED.to_string(),
        ]
    );
}

#[test]
fn unconfirmed_exit_resumes_guidance() {
    let spoken = RecordingAnnouncer::default();
    let mut machine = AcquisitionMachine::new(settings(ExitTimeoutAction::Resume), true, spoken.boxed());
    let t0 = Instant::now();

    let states = replay(
        &mut machine,
        t0,
        &[
            (0.0, Input::Press),
            (3.0, Input::Heard("keys")),
            (5.0, Input::Press),
            (7.9, Input::Poll),
            (8.0, Input::Poll),
            (8.1, Input::Poll),
        ],
    );
    assert_eq!(states, vec![Listening, Active, ExitDecision, ExitDecision, Active, Active]);
    assert_eq!(machine.target(), Some("keys"));
    assert_eq!(spoken.spoken().last().map(String::as_str), Some(announce::RESUMING));
}

#[test]
fn unconfirmed_exit_can_end_the_cycle() {
    let spoken = RecordingAnnouncer::default();
    let mut machine = AcquisitionMachine::new(settings(ExitTimeoutAction::Idle), true, spoken.boxed());
    let t0 = Instant::now();

    let states = replay(
        &mut machine,
        t0,
        &[
            (0.0, Input::Press),
            (3.0, Input::Silence),
            (5.0, Input::Press),
            (8.0, Input::Poll),
        ],
    );
    assert_eq!(states, vec![Listening, Active, ExitDecision, Idle]);
    assert_eq!(machine.target(), None);
    assert_eq!(spoken.spoken().last().map(String::as_str), Some(announce::STOPPED));
}

#[test]
fn second_press_inside_cooldown_does_not_confirm_exit() {
    let spoken = RecordingAnnouncer::default();
    let mut machine = AcquisitionMachine::new(settings(ExitTimeoutAction::Resume), false, spoken.boxed());
    let t0 = Instant::now();

    let states = replay(
        &mut machine,
        t0,
        &[
            (0.0, Input::Press),
            (2.0, Input::Press),
            (2.3, Input::Press),
            (2.6, Input::Press),
        ],
    );
    assert_eq!(states, vec![Active, ExitDecision, ExitDecision, Idle]);
}

#[test]
fn next_cycle_remembers_previous_target_on_silence() {
    let spoken = RecordingAnnouncer::default();
    let mut machine = AcquisitionMachine::new(settings(ExitTimeoutAction::Resume), true, spoken.boxed());
    let t0 = Instant::now();

    let states = replay(
        &mut machine,
        t0,
        &[
            (0.0, Input::Press),
            (3.0, Input::Heard("phone")),
            (4.0, Input::Press),
            (5.0, Input::Press),
            (20.0, Input::Press),
            (23.0, Input::Silence),
        ],
    );
    assert_eq!(states, vec![Listening, Active, ExitDecision, Idle, Listening, Active]);
    assert_eq!(machine.target(), Some("phone"));
    assert!(spoken.spoken().contains(&announce::NOTHING_HEARD.to_string()));
}

#[test]
fn transcripts_outside_listening_are_ignored() {
    let spoken = RecordingAnnouncer::default();
    let mut machine = AcquisitionMachine::new(settings(ExitTimeoutAction::Resume), true, spoken.boxed());
    let t0 = Instant::now();

    let states = replay(
        &mut machine,
        t0,
        &[(0.0, Input::Heard("cup")), (1.0, Input::Poll)],
    );
    assert_eq!(states, vec![Idle, Idle]);
    assert_eq!(machine.target(), None);
    assert!(spoken.spoken().is_empty());
}
