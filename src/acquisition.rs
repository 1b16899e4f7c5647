//! Acquisition state machine.
//!
//! Decides when guidance may run and which object it is guiding to.
//!
//! ```text
//! Idle         --press-->            Listening  (Active when speech is unavailable)
//! Listening    --transcript/silence-> Active    (Idle on silence if speech is required)
//! Active       --press-->            ExitDecision
//! ExitDecision --press-->            Idle
//! ExitDecision --timeout-->          Active     (or Idle, per on_exit_timeout)
//! ```
//!
//! The machine only keeps state and speaks. Starting cameras, running detection and
//! stopping motors is the runtime's response to the `Transition`s it returns.
//! Time is passed in explicitly so sequences can be replayed deterministically.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::config::GuideConfig;
use crate::input::announce;
use crate::input::{normalize_transcript, Announcer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Listening,
    Active,
    ExitDecision,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Listening => "listening",
            AcquisitionState::Active => "active",
            AcquisitionState::ExitDecision => "exit-decision",
        };
        f.write_str(name)
    }
}

/// What an unconfirmed exit decision falls back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitTimeoutAction {
    /// Back to `Active` with the same target.
    Resume,
    /// Stop the cycle as if the exit had been confirmed.
    Idle,
}

impl FromStr for ExitTimeoutAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resume" | "active" => Ok(ExitTimeoutAction::Resume),
            "idle" | "stop" => Ok(ExitTimeoutAction::Idle),
            other => Err(anyhow!(
                "unknown exit timeout action '{}' (expected resume or idle)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MachineSettings {
    pub exit_timeout: Duration,
    pub on_exit_timeout: ExitTimeoutAction,
    /// Presses closer together than this are treated as one.
    pub cooldown: Duration,
    /// Silence with no previous target ends the cycle instead of guiding to the
    /// closest object.
    pub speech_required: bool,
}

impl MachineSettings {
    pub fn from_config(config: &GuideConfig) -> Self {
        Self {
            exit_timeout: config.acquisition.exit_timeout,
            on_exit_timeout: config.acquisition.on_exit_timeout,
            cooldown: config.button.cooldown,
            speech_required: config.speech.required,
        }
    }
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self::from_config(&GuideConfig::defaults())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: AcquisitionState,
    pub to: AcquisitionState,
}

pub struct AcquisitionMachine {
    settings: MachineSettings,
    state: AcquisitionState,
    target: Option<String>,
    speech_available: bool,
    last_press: Option<Instant>,
    exit_deadline: Option<Instant>,
    announcer: Box<dyn Announcer>,
}

impl AcquisitionMachine {
    pub fn new(
        settings: MachineSettings,
        speech_available: bool,
        announcer: Box<dyn Announcer>,
    ) -> Self {
        Self {
            settings,
            state: AcquisitionState::Idle,
            target: None,
            speech_available,
            last_press: None,
            exit_deadline: None,
            announcer,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Name of the object being guided to, if one was asked for.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn speech_available(&self) -> bool {
        self.speech_available
    }

    /// Preset the target name, as if it had been spoken.
    pub fn set_target(&mut self, name: Option<&str>) {
        self.target = name.and_then(normalize_transcript);
    }

    /// Handle one debounced button edge.
    pub fn on_button(&mut self, now: Instant) -> Option<Transition> {
        if let Some(last) = self.last_press {
            if now.saturating_duration_since(last) < self.settings.cooldown {
                log::debug!("button press within cooldown ignored");
                return None;
            }
        }

        let transition = match self.state {
            AcquisitionState::Idle if self.speech_available => {
                self.announce(announce::LISTENING);
                self.enter(AcquisitionState::Listening)
            }
            AcquisitionState::Idle => {
                self.announce_guidance();
                self.enter(AcquisitionState::Active)
            }
            AcquisitionState::Listening => {
                log::debug!("button press while listening ignored");
                return None;
            }
            AcquisitionState::Active => {
                self.exit_deadline = Some(now + self.settings.exit_timeout);
                self.announce(announce::PRESS_AGAIN);
                self.enter(AcquisitionState::ExitDecision)
            }
            AcquisitionState::ExitDecision => {
                self.announce(announce::STOPPED);
                self.enter(AcquisitionState::Idle)
            }
        };
        self.last_press = Some(now);
        Some(transition)
    }

    /// Result of one listen window. Ignored outside `Listening`.
    pub fn on_transcript(&mut self, transcript: Option<String>, _now: Instant) -> Option<Transition> {
        if self.state != AcquisitionState::Listening {
            log::warn!("transcript received while {}, ignored", self.state);
            return None;
        }

        match transcript.as_deref().and_then(normalize_transcript) {
            Some(name) => {
                log::info!("target set to '{}'", name);
                self.target = Some(name);
            }
            None => {
                self.announce(announce::NOTHING_HEARD);
                if self.target.is_none() && self.settings.speech_required {
                    return Some(self.enter(AcquisitionState::Idle));
                }
            }
        }
        self.announce_guidance();
        Some(self.enter(AcquisitionState::Active))
    }

    /// The recognizer failed: listening is disabled for the rest of the process and
    /// a pending listen falls through to guidance.
    pub fn on_speech_failure(&mut self) -> Option<Transition> {
        if self.speech_available {
            self.speech_available = false;
            self.announce(announce::SPEECH_UNAVAILABLE);
        }
        if self.state != AcquisitionState::Listening {
            return None;
        }
        self.announce_guidance();
        Some(self.enter(AcquisitionState::Active))
    }

    /// Time-driven transitions: the exit decision window running out.
    pub fn poll(&mut self, now: Instant) -> Option<Transition> {
        if self.state != AcquisitionState::ExitDecision {
            return None;
        }
        let deadline = self.exit_deadline?;
        if now < deadline {
            return None;
        }
        match self.settings.on_exit_timeout {
            ExitTimeoutAction::Resume => {
                self.announce(announce::RESUMING);
                Some(self.enter(AcquisitionState::Active))
            }
            ExitTimeoutAction::Idle => {
                self.announce(announce::STOPPED);
                Some(self.enter(AcquisitionState::Idle))
            }
        }
    }

    /// Time left to confirm an exit, while in `ExitDecision`.
    pub fn exit_remaining(&self, now: Instant) -> Option<Duration> {
        match (self.state, self.exit_deadline) {
            (AcquisitionState::ExitDecision, Some(deadline)) => {
                Some(deadline.saturating_duration_since(now))
            }
            _ => None,
        }
    }

    /// Start guiding straight away, skipping the button and listening.
    pub fn start_continuous(&mut self) -> Option<Transition> {
        if self.state != AcquisitionState::Idle {
            return None;
        }
        self.announce_guidance();
        Some(self.enter(AcquisitionState::Active))
    }

    /// End the current cycle because of a fault, announcing `reason`.
    pub fn abort(&mut self, reason: &str) -> Option<Transition> {
        if self.state == AcquisitionState::Idle {
            return None;
        }
        self.announce(reason);
        Some(self.enter(AcquisitionState::Idle))
    }

    /// Speak `text`. Failures are logged and otherwise ignored.
    pub fn announce(&mut self, text: &str) {
        if let Err(err) = self.announcer.speak(text) {
            log::warn!("announcement '{}' failed: {:#}", text, err);
        }
    }

    fn announce_guidance(&mut self) {
        match self.target.clone() {
            Some(name) => self.announce(&announce::searching_for(&name)),
            None => self.announce(announce::GUIDING_CLOSEST),
        }
    }

    fn enter(&mut self, to: AcquisitionState) -> Transition {
        let from = self.state;
        self.state = to;
        if to != AcquisitionState::ExitDecision {
            self.exit_deadline = None;
        }
        log::info!("acquisition: {} -> {}", from, to);
        Transition { from, to }
    }
}
