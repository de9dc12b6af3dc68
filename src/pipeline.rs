//! The narration job: chunk, synthesize, recognize, align, stitch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::align::{Aligner, AlignmentStats};
use crate::audio::{self, AudioEncoder, AudioFormat, EncodedAudio, Encoding, FfmpegEncoder};
use crate::chunker::{self, Chunk};
use crate::config::NarrationConfig;
use crate::document::Document;
use crate::error::{EngineError, NarrationError};
use crate::manifest::{ArtifactKeys, AudioRef, Manifest, MANIFEST_SCHEMA_VERSION};
use crate::segments::{self, AlignedSegment};
use crate::stitch::{self, ChunkOutcome};
use crate::store::{self, ObjectStore};
use crate::{SpeechRecognizer, SpeechSynthesizer};

/// Largest gap between a reported and a measured chunk duration that
/// passes without a warning.
const DURATION_TOLERANCE_SECS: f64 = 1e-3;

/// Shared flag that stops a running narration at the next chunk stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), NarrationError> {
        if self.is_cancelled() {
            Err(NarrationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs narrations with one set of engines and settings.
pub struct Narrator {
    synthesizer: Box<dyn SpeechSynthesizer>,
    recognizer: Box<dyn SpeechRecognizer>,
    encoder: Option<Box<dyn AudioEncoder>>,
    config: NarrationConfig,
}

impl Narrator {
    /// A narrator with default settings that stores MP3 through `ffmpeg`.
    pub fn new(
        synthesizer: Box<dyn SpeechSynthesizer>,
        recognizer: Box<dyn SpeechRecognizer>,
    ) -> Self {
        Self {
            synthesizer,
            recognizer,
            encoder: None,
            config: NarrationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NarrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn AudioEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    pub fn narrate(&self, document: &Document) -> Result<Narration, NarrationError> {
        self.narrate_with_cancel(document, &CancelToken::new())
    }

    /// Narrate `document`, checking `cancel` before every chunk stage.
    ///
    /// Nothing is written anywhere; call [`Narration::persist`] on the result.
    pub fn narrate_with_cancel(
        &self,
        document: &Document,
        cancel: &CancelToken,
    ) -> Result<Narration, NarrationError> {
        self.check_config()?;

        let chunks = chunker::split(document.text(), self.config.chunk_max_chars)?;
        if chunks.is_empty() {
            return Err(NarrationError::EmptyDocument);
        }
        log::info!(
            "Narrating '{}': {} chars in {} chunk(s)",
            document.title(),
            document.char_len(),
            chunks.len()
        );

        let aligner = Aligner::new(self.config.align.clone());
        let outcomes = if self.config.parallel_chunks {
            chunks
                .into_par_iter()
                .map(|chunk| self.process_chunk(chunk, &aligner, cancel))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            chunks
                .into_iter()
                .map(|chunk| self.process_chunk(chunk, &aligner, cancel))
                .collect::<Result<Vec<_>, _>>()?
        };
        cancel.check()?;

        let timeline = stitch::accumulate(outcomes);
        let wav = audio::concat_wavs(&timeline.wavs)?;
        log::info!(
            "Stitched {} chunk(s) into {:.1}s of audio",
            timeline.chunks.len(),
            timeline.total_duration_secs()
        );

        let audio = self.encode(wav);
        let alignment = AlignmentStats::from_segments(&timeline.segments);
        if alignment.unaligned_segments > 0 {
            log::warn!(
                "{} of {} segment(s) could not be aligned to the text",
                alignment.unaligned_segments,
                alignment.total_segments
            );
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let keys = ArtifactKeys::new(&id);
        let manifest = Manifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            title: document.title().to_string(),
            created_at: chrono::Utc::now(),
            voice: self.config.voice.clone(),
            speed: self.config.speed,
            tts_chunk_max_chars: self.config.chunk_max_chars,
            chunks: timeline.chunks,
            audio: AudioRef {
                format: audio.format,
                key: keys.audio(audio.format),
                mime: audio.format.mime().to_string(),
            },
            alignment,
            id,
        };

        Ok(Narration {
            manifest,
            text: document.text().to_string(),
            segments: timeline.segments,
            audio,
        })
    }

    fn check_config(&self) -> Result<(), NarrationError> {
        self.config.validate()?;
        if let Some(limit) = self.synthesizer.max_input_chars() {
            if self.config.chunk_max_chars > limit {
                return Err(NarrationError::config(format!(
                    "chunk_max_chars {} exceeds the synthesizer limit of {limit}",
                    self.config.chunk_max_chars
                )));
            }
        }
        Ok(())
    }

    fn process_chunk(
        &self,
        chunk: Chunk,
        aligner: &Aligner,
        cancel: &CancelToken,
    ) -> Result<ChunkOutcome, NarrationError> {
        let index = chunk.index;
        let engine_error = |stage: &'static str, e: EngineError| {
            if cancel.is_cancelled() {
                NarrationError::Cancelled
            } else {
                NarrationError::engine(stage, index, e)
            }
        };

        cancel.check()?;
        log::info!("Synthesizing chunk {} ({} chars)", chunk.index, chunk.char_len());
        let mut audio = self
            .synthesizer
            .synthesize_with_cancel(&chunk.text, &self.config.voice, self.config.speed, cancel)
            .map_err(|e| engine_error("synthesis", e))?;
        let measured = audio::wav_duration_secs(&audio.wav)?;
        if (measured - audio.duration_secs).abs() > DURATION_TOLERANCE_SECS {
            log::warn!(
                "Chunk {}: engine reported {:.3}s but the WAV holds {:.3}s, using the WAV",
                chunk.index,
                audio.duration_secs,
                measured
            );
        }
        audio.duration_secs = measured;

        cancel.check()?;
        log::info!(
            "Recognizing chunk {} ({:.1}s of audio)",
            chunk.index,
            audio.duration_secs
        );
        let raw = self
            .recognizer
            .recognize_with_cancel(&audio.wav, cancel)
            .map_err(|e| engine_error("recognition", e))?;

        let merge = &self.config.merge;
        let merged = segments::merge(&raw, merge.max_seconds, merge.max_chars);
        let aligned = aligner.align_chunk(&chunk.text, merged);
        log::info!(
            "Chunk {}: {} raw segment(s), {} aligned of {}",
            chunk.index,
            raw.len(),
            aligned.iter().filter(|s| s.is_aligned()).count(),
            aligned.len()
        );

        Ok(ChunkOutcome {
            chunk,
            audio,
            segments: aligned,
        })
    }

    fn encode(&self, wav: Vec<u8>) -> EncodedAudio {
        let encoding = match &self.encoder {
            Some(encoder) => encoder.encode(&wav),
            None => FfmpegEncoder::new(self.config.mp3_bitrate_kbps).encode(&wav),
        };
        match encoding {
            Encoding::Encoded(encoded) => encoded,
            Encoding::Unavailable(reason) => {
                log::warn!("Compressed encoding unavailable ({reason}), storing WAV");
                EncodedAudio {
                    format: AudioFormat::Wav,
                    bytes: wav,
                }
            }
        }
    }
}

/// A finished narration, held in memory until persisted.
#[derive(Debug, Clone)]
pub struct Narration {
    manifest: Manifest,
    text: String,
    segments: Vec<AlignedSegment>,
    audio: EncodedAudio,
}

impl Narration {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Segments in global time with document char spans.
    pub fn segments(&self) -> &[AlignedSegment] {
        &self.segments
    }

    pub fn audio(&self) -> &EncodedAudio {
        &self.audio
    }

    /// Write all artifacts under `items/{id}/`. The manifest goes last, so
    /// its presence marks a complete set.
    pub fn persist(&self, store: &dyn ObjectStore) -> Result<(), NarrationError> {
        let keys = ArtifactKeys::new(self.id());
        store.write_text(&keys.full_text(), &self.text)?;
        store.write(&self.manifest.audio.key, &self.audio.bytes, &self.manifest.audio.mime)?;
        store::write_json(store, &keys.segments(), &self.segments)?;
        store::write_json(store, &keys.manifest(), &self.manifest)?;
        log::info!("Stored narration {} ({} segments)", self.id(), self.segments.len());
        Ok(())
    }
}
