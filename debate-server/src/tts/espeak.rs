use debate_shared::Voice;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::ServiceError;

/// Blocking local speech synthesis. Callers run it off the async workers.
pub trait SpeechEngine: Send + Sync {
    fn synthesize_to_file(&self, text: &str, path: &Path) -> Result<(), ServiceError>;

    fn voices(&self) -> Result<Vec<Voice>, ServiceError>;
}

/// `espeak-ng` (or a compatible binary) driven through its CLI.
pub struct Espeak {
    command: String,
    rate: u32,
    amplitude: u32,
}

impl Espeak {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            rate: 175,
            amplitude: 90,
        }
    }
}

impl SpeechEngine for Espeak {
    fn synthesize_to_file(&self, text: &str, path: &Path) -> Result<(), ServiceError> {
        debug!("Running {} into {}", self.command, path.display());
        let mut child = Command::new(&self.command)
            .arg("-s")
            .arg(self.rate.to_string())
            .arg("-a")
            .arg(self.amplitude.to_string())
            .arg("-w")
            .arg(path)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // Always reap the child, even when feeding it text failed.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(text.as_bytes()),
            None => Ok(()),
        };

        let output = child.wait_with_output()?;
        if let Err(e) = written {
            return Err(ServiceError::Synthesis(format!(
                "could not write text to {} (exited with {}): {}",
                self.command, output.status, e
            )));
        }
        if !output.status.success() {
            return Err(ServiceError::Synthesis(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn voices(&self) -> Result<Vec<Voice>, ServiceError> {
        let output = Command::new(&self.command).arg("--voices").output()?;
        if !output.status.success() {
            return Err(ServiceError::Synthesis(format!(
                "{} --voices exited with {}",
                self.command, output.status
            )));
        }
        let voices = parse_voice_table(&String::from_utf8_lossy(&output.stdout));
        if voices.is_empty() {
            return Err(ServiceError::Synthesis("no voices installed".to_string()));
        }
        Ok(voices)
    }
}

/// Parse the `--voices` table. Ids are row positions, names come from the
/// VoiceName column with underscores shown as spaces.
fn parse_voice_table(table: &str) -> Vec<Voice> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(3))
        .enumerate()
        .map(|(i, name)| Voice::new(i.to_string(), name.replace('_', " ")))
        .collect()
}
