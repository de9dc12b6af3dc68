use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::align::AlignmentStats;
use crate::audio::AudioFormat;
use crate::error::NarrationError;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Offsets within this tolerance count as equal when checking the timeline.
const OFFSET_TOLERANCE_SECS: f64 = 1e-6;

/// How one chunk sits in the document and on the audio timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkManifestEntry {
    pub index: usize,
    pub orig_char_start: usize,
    pub orig_char_end: usize,
    pub chars: usize,
    pub duration_seconds: f64,
    pub audio_offset_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRef {
    pub format: AudioFormat,
    pub key: String,
    pub mime: String,
}

/// Persisted description of one narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub voice: String,
    pub speed: f32,
    pub tts_chunk_max_chars: usize,
    pub chunks: Vec<ChunkManifestEntry>,
    pub audio: AudioRef,
    #[serde(default)]
    pub alignment: AlignmentStats,
}

impl Manifest {
    pub fn total_duration_secs(&self) -> f64 {
        self.chunks.iter().map(|c| c.duration_seconds).sum()
    }

    /// Check that chunks are ordered, disjoint and laid end to end in time.
    pub fn verify(&self) -> Result<(), NarrationError> {
        if self.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(NarrationError::InconsistentManifest(format!(
                "unsupported schema version {}",
                self.schema_version
            )));
        }

        let mut expected_offset = 0.0;
        let mut prev_end = 0;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let problem = if chunk.index != i {
                Some(format!("chunk {i} has index {}", chunk.index))
            } else if chunk.orig_char_start < prev_end
                || chunk.orig_char_end < chunk.orig_char_start
            {
                Some(format!(
                    "chunk {i} span {}..{} overlaps or is reversed",
                    chunk.orig_char_start, chunk.orig_char_end
                ))
            } else if (chunk.audio_offset_seconds - expected_offset).abs() > OFFSET_TOLERANCE_SECS {
                Some(format!(
                    "chunk {i} starts at {:.3}s, expected {expected_offset:.3}s",
                    chunk.audio_offset_seconds
                ))
            } else {
                None
            };
            if let Some(problem) = problem {
                return Err(NarrationError::InconsistentManifest(problem));
            }
            prev_end = chunk.orig_char_end;
            expected_offset += chunk.duration_seconds;
        }
        Ok(())
    }
}

/// Storage keys of one narration's artifacts, under `items/{id}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKeys {
    prefix: String,
}

impl ArtifactKeys {
    pub fn new(id: &str) -> Self {
        Self {
            prefix: format!("items/{id}"),
        }
    }

    pub fn full_text(&self) -> String {
        format!("{}/full.txt", self.prefix)
    }

    pub fn segments(&self) -> String {
        format!("{}/segments.json", self.prefix)
    }

    pub fn manifest(&self) -> String {
        format!("{}/manifest.json", self.prefix)
    }

    pub fn audio(&self, format: AudioFormat) -> String {
        format!("{}/audio.{}", self.prefix, format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        index: usize,
        start: usize,
        end: usize,
        duration: f64,
        offset: f64,
    ) -> ChunkManifestEntry {
        ChunkManifestEntry {
            index,
            orig_char_start: start,
            orig_char_end: end,
            chars: end - start,
            duration_seconds: duration,
            audio_offset_seconds: offset,
        }
    }

    fn manifest(chunks: Vec<ChunkManifestEntry>) -> Manifest {
        Manifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            id: "abc".to_string(),
            title: "Doc".to_string(),
            created_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            voice: "en-us".to_string(),
            speed: 1.0,
            tts_chunk_max_chars: 3600,
            chunks,
            audio: AudioRef {
                format: AudioFormat::Wav,
                key: "items/abc/audio.wav".to_string(),
                mime: "audio/wav".to_string(),
            },
            alignment: AlignmentStats::default(),
        }
    }

    #[test]
    fn keys_live_under_item_prefix() {
        let keys = ArtifactKeys::new("abc");
        assert_eq!(keys.full_text(), "items/abc/full.txt");
        assert_eq!(keys.segments(), "items/abc/segments.json");
        assert_eq!(keys.manifest(), "items/abc/manifest.json");
        assert_eq!(keys.audio(AudioFormat::Mp3), "items/abc/audio.mp3");
    }

    #[test]
    fn verify_accepts_contiguous_timeline() {
        let m = manifest(vec![
            entry(0, 0, 100, 5.0, 0.0),
            entry(1, 102, 200, 4.5, 5.0),
            entry(2, 200, 260, 2.0, 9.5),
        ]);
        assert!(m.verify().is_ok());
        assert_eq!(m.total_duration_secs(), 11.5);
    }

    #[test]
    fn verify_rejects_gaps_in_time_and_overlaps() {
        let late = manifest(vec![entry(0, 0, 100, 5.0, 0.0), entry(1, 100, 200, 4.0, 6.0)]);
        assert!(late.verify().is_err());

        let overlap = manifest(vec![entry(0, 0, 100, 5.0, 0.0), entry(1, 90, 200, 4.0, 5.0)]);
        assert!(overlap.verify().is_err());
    }

    #[test]
    fn json_shape_is_stable() {
        let m = manifest(vec![entry(0, 0, 10, 1.5, 0.0)]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["audio"]["format"], "wav");
        assert_eq!(json["chunks"][0]["audio_offset_seconds"], 0.0);
        assert_eq!(json["tts_chunk_max_chars"], 3600);

        let back: Manifest = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
