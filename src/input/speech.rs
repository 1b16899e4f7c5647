use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::CommandLine;

/// Extra time a recognizer process gets beyond the listen window before it is killed.
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// Blocking speech-to-text, bounded by the listen window.
///
/// `Ok(None)` means nothing usable was heard. `Err` means the recognizer itself is
/// broken.
pub trait SpeechRecognizer: Send {
    fn listen(&mut self, duration: Duration) -> Result<Option<String>>;
}

/// Trim and lower-case a transcript; empty becomes `None`.
pub fn normalize_transcript(raw: &str) -> Option<String> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Runs an external recognizer per utterance.
///
/// The listen window in whole seconds is appended as the last argument. Stdout is
/// the transcript, either plain text or a JSON object with a `text` field.
pub struct CommandRecognizer {
    command: CommandLine,
}

impl CommandRecognizer {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn listen(&mut self, duration: Duration) -> Result<Option<String>> {
        let secs = duration.as_secs().max(1);
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn speech recognizer {}", self.command.program))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("speech recognizer stdout unavailable"))?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut out = String::new();
            let result = stdout.read_to_string(&mut out).map(|_| out);
            let _ = tx.send(result);
        });

        let output = match rx.recv_timeout(duration + PROCESS_GRACE) {
            Ok(output) => output.context("read speech recognizer output")?,
            Err(_) => {
                log::warn!("speech: recognizer exceeded {:?}, killing it", duration + PROCESS_GRACE);
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
        };

        let status = child.wait().context("wait for speech recognizer")?;
        if !status.success() {
            return Err(anyhow!("speech recognizer exited with {}", status));
        }
        Ok(normalize_transcript(&extract_text(&output)))
    }
}

fn extract_text(output: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(output.trim()) {
        Ok(serde_json::Value::Object(map)) => map
            .get("text")
            .and_then(|text| text.as_str())
            .unwrap_or_default()
            .to_string(),
        _ => output.to_string(),
    }
}

/// Replays queued transcripts, one per `listen` call. Empty queue hears nothing.
#[derive(Default)]
pub struct ScriptedRecognizer {
    transcripts: VecDeque<Option<String>>,
}

impl ScriptedRecognizer {
    pub fn new<I, S>(transcripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            transcripts: transcripts
                .into_iter()
                .map(|text| normalize_transcript(text.as_ref()))
                .collect(),
        }
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn listen(&mut self, _duration: Duration) -> Result<Option<String>> {
        Ok(self.transcripts.pop_front().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcripts_are_normalized() {
        assert_eq!(normalize_transcript("  Bottle \n"), Some("bottle".to_string()));
        assert_eq!(normalize_transcript(" \t"), None);
    }

    #[test]
    fn json_text_field_is_extracted() {
        assert_eq!(extract_text(r#"{"text": "the cup"}"#), "the cup");
        assert_eq!(extract_text(r#"{"partial": "x"}"#), "");
        assert_eq!(extract_text("plain words\n"), "plain words\n");
    }

    #[test]
    fn scripted_recognizer_replays_then_hears_nothing() {
        let mut rec = ScriptedRecognizer::new(["Bottle", ""]);
        let window = Duration::from_secs(3);
        assert_eq!(rec.listen(window).unwrap(), Some("bottle".to_string()));
        assert_eq!(rec.listen(window).unwrap(), None);
        assert_eq!(rec.listen(window).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn command_recognizer_reads_stdout() {
        let mut rec = CommandRecognizer::new(CommandLine::parse("echo Keys").unwrap());
        assert_eq!(
            rec.listen(Duration::from_secs(1)).unwrap(),
            Some("keys 1".to_string())
        );
    }

    #[test]
    fn missing_recognizer_is_an_error() {
        let mut rec =
            CommandRecognizer::new(CommandLine::parse("definitely-not-a-recognizer-binary").unwrap());
        assert!(rec.listen(Duration::from_secs(1)).is_err());
    }
}
