//! # narrate-rs
//!
//! A Rust library that turns a text document into narrated audio with a
//! transcript aligned back to the document, so a reader can click a passage
//! and hear it.
//!
//! ## Features
//!
//! - **Chunked synthesis**: Long documents are split into engine-sized chunks
//!   that keep their exact character position in the source text
//! - **Fuzzy alignment**: Recognized speech is matched back to the document
//!   even when the transcript differs slightly from the text
//! - **Pluggable engines**: Speech synthesis, speech recognition and audio
//!   encoding are traits; `espeak-ng`, command-line recognizers and `ffmpeg`
//!   implementations ship with the crate
//! - **Portable artifacts**: Full text, audio, aligned segments and a
//!   manifest are written to any [`store::ObjectStore`]
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! narrate-rs = "2026.10"
//! ```
//!
//! ```ignore
//! use narrate_rs::engines::{command::CommandRecognizer, espeak::EspeakSynthesizer};
//! use narrate_rs::{pipeline::Narrator, store::LocalStore, Document};
//!
//! let document = Document::new("Notes", std::fs::read_to_string("notes.txt")?);
//! let recognizer = CommandRecognizer::new("whisper-json").arg("{input}");
//! let narrator = Narrator::new(Box::new(EspeakSynthesizer::new()), Box::new(recognizer));
//!
//! let narration = narrator.narrate(&document)?;
//! narration.persist(&LocalStore::new("library"))?;
//! println!("stored items/{}/", narration.id());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod align;
pub mod audio;
pub mod chunker;
pub mod config;
pub mod document;
pub mod engines;
pub mod error;
pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod playback;
pub mod segments;
pub mod stitch;
pub mod store;

use std::path::Path;

pub use config::NarrationConfig;
pub use document::Document;
pub use error::{EngineError, NarrationError};
pub use pipeline::CancelToken;
pub use segments::{AlignedSegment, RawSegment, TextSpan};

/// Audio produced for one chunk of text.
///
/// Holds a complete WAV file and its duration. Every chunk of a narration
/// must share the same WAV format, or stitching fails.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// A complete WAV file, header included
    pub wav: Vec<u8>,
    /// Playback length of `wav` in seconds
    pub duration_secs: f64,
}

impl SynthesizedAudio {
    /// Wrap raw mono f32 samples as a 32-bit float WAV.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self, NarrationError> {
        Ok(Self {
            wav: audio::encode_wav(samples, sample_rate)?,
            duration_secs: samples.len() as f64 / sample_rate as f64,
        })
    }

    /// Wrap an existing WAV file, reading its duration from the header.
    pub fn from_wav(wav: Vec<u8>) -> Result<Self, NarrationError> {
        let duration_secs = audio::wav_duration_secs(&wav)?;
        Ok(Self { wav, duration_secs })
    }

    /// Write the audio to a WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), NarrationError> {
        std::fs::write(path, &self.wav)?;
        Ok(())
    }
}

/// Common interface for text-to-speech engines.
///
/// Implementations must be usable from several threads at once when
/// [`NarrationConfig::parallel_chunks`] is enabled.
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize speech for `text` with the given voice and speed multiplier.
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<SynthesizedAudio, EngineError>;

    /// Like [`synthesize`](Self::synthesize), but gives up once `cancel`
    /// fires. Engines that can abort mid-call override this.
    fn synthesize_with_cancel(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        _cancel: &CancelToken,
    ) -> Result<SynthesizedAudio, EngineError> {
        self.synthesize(text, voice, speed)
    }

    /// The largest input, in chars, the engine accepts in one request.
    ///
    /// The narrator refuses chunk budgets above this value.
    fn max_input_chars(&self) -> Option<usize> {
        None
    }
}

/// Common interface for speech-to-text engines.
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe a WAV file into timestamped segments, in seconds from the
    /// start of that file.
    fn recognize(&self, wav: &[u8]) -> Result<Vec<RawSegment>, EngineError>;

    /// Like [`recognize`](Self::recognize), but gives up once `cancel` fires.
    fn recognize_with_cancel(
        &self,
        wav: &[u8],
        _cancel: &CancelToken,
    ) -> Result<Vec<RawSegment>, EngineError> {
        self.recognize(wav)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_become_a_wav_with_matching_duration() {
        let audio = SynthesizedAudio::from_samples(&vec![0.25f32; 12_000], 24_000).unwrap();
        assert_eq!(audio.duration_secs, 0.5);
        assert_eq!(&audio.wav[..4], b"RIFF");

        let again = SynthesizedAudio::from_wav(audio.wav.clone()).unwrap();
        assert_eq!(again.duration_secs, 0.5);
    }

    #[test]
    fn write_wav_writes_the_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.wav");
        let audio = SynthesizedAudio::from_samples(&[0.0, 0.1, -0.1], 16_000).unwrap();
        audio.write_wav(&path).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 3);
    }
}
