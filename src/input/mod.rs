//! User-facing I/O collaborators: the push button, speech capture and announcements.

pub mod announce;
mod button;
mod speech;

use crate::config::SpeechSettings;

pub use announce::{open_announcer, Announcer, CommandAnnouncer, LogAnnouncer};
pub use button::{open_button, ButtonInput, ButtonLatch, ButtonSource};
pub use speech::{normalize_transcript, CommandRecognizer, ScriptedRecognizer, SpeechRecognizer};

/// An external program and its leading arguments, split on whitespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Speech recognizer from configuration; `None` when speech is not configured.
pub fn open_recognizer(settings: &SpeechSettings) -> Option<Box<dyn SpeechRecognizer>> {
    let command = settings.command.as_deref().and_then(CommandLine::parse)?;
    log::info!("speech recognizer: {}", command.program);
    Some(Box::new(CommandRecognizer::new(command)))
}
