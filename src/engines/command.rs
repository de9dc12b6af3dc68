//! Speech-to-text through an external program.
//!
//! The program receives the chunk audio as a WAV file and must print a
//! verbose JSON transcript on stdout:
//!
//! ```json
//! { "text": "...", "segments": [ { "start": 0.0, "end": 2.4, "text": "Hello there." } ] }
//! ```
//!
//! Fields other than `segments` and each segment's `start`, `end` and
//! `text` are ignored, so the output of most Whisper front ends works as is.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EngineError, NarrationError};
use crate::segments::RawSegment;
use crate::{CancelToken, SpeechRecognizer};

use super::{run, RunLimits, DEFAULT_ENGINE_TIMEOUT};

/// Replaced by the path of the WAV file in recognizer arguments.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Runs a recognizer program once per chunk.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Some(DEFAULT_ENGINE_TIMEOUT),
        }
    }

    /// Kill the program after `timeout`; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments with the placeholder substituted. Without a placeholder the
    /// input path is appended.
    fn command_args(&self, input: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, input))
            .collect();
        if !self.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            args.push(input.to_string());
        }
        args
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn recognize(&self, wav: &[u8]) -> Result<Vec<RawSegment>, EngineError> {
        self.recognize_with_cancel(wav, &CancelToken::new())
    }

    fn recognize_with_cancel(
        &self,
        wav: &[u8],
        cancel: &CancelToken,
    ) -> Result<Vec<RawSegment>, EngineError> {
        let mut input = tempfile::Builder::new().suffix(".wav").tempfile()?;
        input.write_all(wav)?;
        input.flush()?;

        let path = input.path().to_string_lossy().into_owned();
        let limits = RunLimits {
            timeout: self.timeout,
            cancel,
        };
        let stdout = run(&self.program, self.command_args(&path), None, limits)?;
        let segments = parse_verbose_json(&String::from_utf8_lossy(&stdout))?;
        log::debug!(
            "{} returned {} segment(s)",
            self.program.display(),
            segments.len()
        );
        Ok(segments)
    }
}

#[derive(Deserialize)]
struct VerboseTranscript {
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

#[derive(Deserialize)]
struct TranscriptSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

/// Parse a verbose JSON transcript into raw segments.
///
/// Segments must have finite, non-negative times with `end >= start`.
pub fn parse_verbose_json(json: &str) -> Result<Vec<RawSegment>, NarrationError> {
    let transcript: VerboseTranscript = serde_json::from_str(json.trim())?;
    transcript
        .segments
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let valid = s.start.is_finite() && s.end.is_finite() && s.start >= 0.0;
            if !valid || s.end < s.start {
                return Err(NarrationError::Transcript(format!(
                    "segment {i} has invalid times {}..{}",
                    s.start, s.end
                )));
            }
            Ok(RawSegment::new(s.start, s.end, s.text))
        })
        .collect()
}
