//! Text-to-speech through the `espeak-ng` command-line synthesizer.
//!
//! **espeak-ng** must be installed:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::EngineError;
use crate::{CancelToken, SpeechSynthesizer, SynthesizedAudio};

use super::{run, RunLimits, DEFAULT_ENGINE_TIMEOUT};

/// espeak-ng speaking rate at speed 1.0, in words per minute.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
const MIN_WORDS_PER_MINUTE: u32 = 80;
const MAX_WORDS_PER_MINUTE: u32 = 450;

/// Synthesizes 22.05 kHz mono WAV with `espeak-ng`.
#[derive(Debug, Clone)]
pub struct EspeakSynthesizer {
    /// espeak-ng binary; `None` uses `espeak-ng` from PATH.
    pub bin_path: Option<PathBuf>,
    /// Input cap reported to the narrator, in chars.
    pub max_input_chars: Option<usize>,
    /// espeak-ng is killed after this long; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for EspeakSynthesizer {
    fn default() -> Self {
        Self {
            bin_path: None,
            max_input_chars: None,
            timeout: Some(DEFAULT_ENGINE_TIMEOUT),
        }
    }
}

impl EspeakSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bin_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn bin(&self) -> PathBuf {
        self.bin_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("espeak-ng"))
    }
}

/// espeak-ng `-s` value for a speed multiplier.
pub fn words_per_minute(speed: f32) -> u32 {
    let wpm = (BASE_WORDS_PER_MINUTE * speed).round();
    if !wpm.is_finite() {
        return BASE_WORDS_PER_MINUTE as u32;
    }
    (wpm.max(0.0) as u32).clamp(MIN_WORDS_PER_MINUTE, MAX_WORDS_PER_MINUTE)
}

// espeak-ng reads stdin line by line; an unterminated last line can be
// dropped.
fn stdin_payload(text: &str) -> Cow<'_, str> {
    if text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text}\n"))
    }
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<SynthesizedAudio, EngineError> {
        self.synthesize_with_cancel(text, voice, speed, &CancelToken::new())
    }

    fn synthesize_with_cancel(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        cancel: &CancelToken,
    ) -> Result<SynthesizedAudio, EngineError> {
        // Written to a file: the header espeak-ng streams to a pipe carries
        // placeholder sizes.
        let out = tempfile::Builder::new().suffix(".wav").tempfile()?;
        let wpm = words_per_minute(speed).to_string();
        let args = [
            OsStr::new("-q"),
            OsStr::new("-v"),
            OsStr::new(voice),
            OsStr::new("-s"),
            OsStr::new(&wpm),
            OsStr::new("-w"),
            out.path().as_os_str(),
            OsStr::new("--stdin"),
        ];
        let payload = stdin_payload(text);
        let limits = RunLimits {
            timeout: self.timeout,
            cancel,
        };
        run(&self.bin(), args, Some(payload.as_bytes()), limits)?;

        let wav = std::fs::read(out.path())?;
        let audio = SynthesizedAudio::from_wav(wav)?;
        log::debug!(
            "espeak-ng produced {:.2}s for {} chars (voice {voice}, {wpm} wpm)",
            audio.duration_secs,
            text.chars().count()
        );
        Ok(audio)
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input_chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_maps_to_clamped_words_per_minute() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert_eq!(words_per_minute(0.25), MIN_WORDS_PER_MINUTE);
        assert_eq!(words_per_minute(4.0), MAX_WORDS_PER_MINUTE);
        assert_eq!(words_per_minute(f32::NAN), 175);
    }

    #[test]
    fn stdin_payload_is_newline_terminated() {
        assert_eq!(stdin_payload("hello"), "hello\n");
        assert!(matches!(stdin_payload("hello\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn missing_binary_is_an_engine_error() {
        let synth = EspeakSynthesizer::new().with_bin_path("/nonexistent/espeak-ng");
        let err = synth.synthesize("Hello.", "en-us", 1.0).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn default_run_is_time_bounded() {
        assert_eq!(EspeakSynthesizer::new().timeout, Some(DEFAULT_ENGINE_TIMEOUT));
        let unbounded = EspeakSynthesizer::new().with_timeout(None);
        assert_eq!(unbounded.timeout, None);
    }
}
