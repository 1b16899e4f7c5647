use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::CommandLine;
use crate::config::AnnounceSettings;

pub const READY: &str = "System ready. Press button to start.";
pub const LISTENING: &str = "Listening";
pub const GUIDING_CLOSEST: &str = "Guiding to closest object";
pub const PRESS_AGAIN: &str = "Press again to stop";
pub const STOPPED: &str = "Stopped";
pub const RESUMING: &str = "Resuming";
pub const NOTHING_HEARD: &str = "No object heard";
pub const CAMERA_FAILED: &str = "Camera failed";
pub const DETECTION_ERROR: &str = "Detection error";
pub const SPEECH_UNAVAILABLE: &str = "Speech unavailable";

pub fn searching_for(name: &str) -> String {
    format!("Searching for {}", name)
}

/// Fire-and-forget spoken feedback.
pub trait Announcer: Send {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Announces into the log only.
#[derive(Default)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn speak(&mut self, text: &str) -> Result<()> {
        log::info!("[announce] {}", text);
        Ok(())
    }
}

/// Speaks through an external program (e.g. `espeak`) with the text as last argument.
///
/// `speak` only queues the phrase. A worker thread plays queued phrases one at a
/// time, each to completion, so back-to-back announcements are all heard in order.
/// Dropping the announcer waits for the queue to drain.
pub struct CommandAnnouncer {
    program: String,
    tx: Option<Sender<String>>,
    worker: Option<JoinHandle<()>>,
}

impl CommandAnnouncer {
    pub fn spawn(command: CommandLine) -> Result<Self> {
        let program = command.program.clone();
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("announce".to_string())
            .spawn(move || speech_worker(command, rx))
            .map_err(|e| anyhow!("failed to spawn announcer worker: {}", e))?;
        Ok(Self {
            program,
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl Announcer for CommandAnnouncer {
    fn speak(&mut self, text: &str) -> Result<()> {
        log::info!("[announce] {}", text);
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("announcer {} is closed", self.program))?;
        tx.send(text.to_string())
            .map_err(|_| anyhow!("announcer {} worker is not running", self.program))
    }
}

impl Drop for CommandAnnouncer {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("announcer worker panicked");
            }
        }
    }
}

fn speech_worker(command: CommandLine, rx: Receiver<String>) {
    for text in rx {
        let status = Command::new(&command.program)
            .args(&command.args)
            .arg(&text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("run announcer {}", command.program));
        match status {
            Ok(status) if !status.success() => {
                log::warn!("announcer {} exited with {} for {:?}", command.program, status, text)
            }
            Ok(_) => {}
            Err(err) => log::warn!("{:#}", err),
        }
    }
}

pub fn open_announcer(settings: &AnnounceSettings) -> Box<dyn Announcer> {
    match settings.command.as_deref().and_then(CommandLine::parse) {
        Some(command) => {
            let program = command.program.clone();
            match CommandAnnouncer::spawn(command) {
                Ok(announcer) => {
                    log::info!("announcements via {}", program);
                    Box::new(announcer)
                }
                Err(err) => {
                    log::warn!("{:#}; announcing to the log instead", err);
                    Box::new(LogAnnouncer)
                }
            }
        }
        None => Box::new(LogAnnouncer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_announcer_never_fails() {
        assert!(LogAnnouncer.speak(READY).is_ok());
    }

    #[test]
    fn missing_program_does_not_fail_the_caller() {
        let mut announcer =
            CommandAnnouncer::spawn(CommandLine::parse("no-such-speech-program-here").unwrap())
                .unwrap();
        assert!(announcer.speak(STOPPED).is_ok());
        assert!(announcer.speak(RESUMING).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn back_to_back_announcements_are_all_spoken_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("spoken.log");
        let script = dir.path().join("say.sh");
        std::fs::write(
            &script,
            format!("sleep 0.2\necho \"$1\" >> {}\n", log_path.display()),
        )
        .unwrap();

        let command = CommandLine::parse(&format!("sh {}", script.display())).unwrap();
        let mut announcer = CommandAnnouncer::spawn(command).unwrap();
        announcer.speak(SPEECH_UNAVAILABLE).unwrap();
        announcer.speak(GUIDING_CLOSEST).unwrap();
        drop(announcer);

        let spoken = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(spoken, format!("{}\n{}\n", SPEECH_UNAVAILABLE, GUIDING_CLOSEST));
    }

    #[test]
    fn search_phrase_names_target() {
        assert_eq!(searching_for("bottle"), "Searching for bottle");
    }
}
