//! Reading stored narrations back for click-to-play.

use serde::Serialize;

use crate::audio::AudioFormat;
use crate::error::NarrationError;
use crate::manifest::{ArtifactKeys, Manifest};
use crate::segments::AlignedSegment;
use crate::store::{self, ObjectStore};

/// A stretch of document text and the audio that speaks it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickableSpan {
    pub orig_char_start: usize,
    pub orig_char_end: usize,
    pub start: f64,
    pub end: f64,
}

/// The stored artifacts of one narration.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub manifest: Manifest,
    pub text: String,
    pub segments: Vec<AlignedSegment>,
    pub audio_key: String,
    pub audio: Vec<u8>,
}

impl Artifacts {
    /// Load the narration stored under `items/{id}/`.
    ///
    /// The audio key comes from the manifest; when that object is missing,
    /// `audio.mp3` and then `audio.wav` are tried.
    pub fn load(store: &dyn ObjectStore, id: &str) -> Result<Self, NarrationError> {
        let keys = ArtifactKeys::new(id);
        let manifest: Manifest = store::read_json(store, &keys.manifest())?
            .ok_or_else(|| NarrationError::NotFound(keys.manifest()))?;
        let text = store.read_text(&keys.full_text())?;
        let segments: Vec<AlignedSegment> = store::read_json(store, &keys.segments())?
            .ok_or_else(|| NarrationError::NotFound(keys.segments()))?;

        let candidates = [
            manifest.audio.key.clone(),
            keys.audio(AudioFormat::Mp3),
            keys.audio(AudioFormat::Wav),
        ];
        let mut audio_key = None;
        for key in candidates {
            if store.exists(&key)? {
                audio_key = Some(key);
                break;
            }
        }
        let audio_key =
            audio_key.ok_or_else(|| NarrationError::NotFound(manifest.audio.key.clone()))?;
        if audio_key != manifest.audio.key {
            log::warn!(
                "Audio for {id} not at {}, using {audio_key}",
                manifest.audio.key
            );
        }
        let audio = store.read(&audio_key)?;

        Ok(Self {
            manifest,
            text,
            segments,
            audio_key,
            audio,
        })
    }

    /// Aligned spans in text order, clamped to the text.
    ///
    /// Empty spans and spans overlapping an earlier one are left out.
    pub fn clickable_spans(&self) -> Vec<ClickableSpan> {
        let text_len = self.text.chars().count();
        let mut spans: Vec<ClickableSpan> = self
            .segments
            .iter()
            .filter_map(|segment| {
                let span = segment.alignment?;
                Some(ClickableSpan {
                    orig_char_start: span.orig_char_start.min(text_len),
                    orig_char_end: span.orig_char_end.min(text_len),
                    start: segment.start,
                    end: segment.end,
                })
            })
            .filter(|s| s.orig_char_end > s.orig_char_start)
            .collect();
        spans.sort_by_key(|s| s.orig_char_start);

        let mut covered_to = 0;
        spans.retain(|s| {
            let keep = s.orig_char_start >= covered_to;
            if keep {
                covered_to = s.orig_char_end;
            }
            keep
        });
        spans
    }

    /// Audio time to start playing from when the reader clicks `char_offset`.
    ///
    /// Uses the span containing the offset, or else the last span starting
    /// before it. `None` before the first span.
    pub fn seek(&self, char_offset: usize) -> Option<f64> {
        let spans = self.clickable_spans();
        let after = spans.partition_point(|s| s.orig_char_start <= char_offset);
        after.checked_sub(1).map(|i| spans[i].start)
    }
}
