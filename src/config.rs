use std::path::Path;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::NarrationError;

/// Search window and acceptance settings for transcript-to-text alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct AlignConfig {
    /// Normalized chars behind the cursor that are still searched.
    pub lookback: usize,
    /// Normalized chars ahead of the cursor that are searched.
    pub ahead: usize,
    /// Minimum fuzzy score (0-100) for a match to be accepted.
    pub threshold: u8,
    /// Queries shorter than this are never aligned.
    pub min_query_len: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            lookback: 250,
            ahead: 9000,
            threshold: 78,
            min_query_len: 10,
        }
    }
}

/// Bounds for coalescing recognizer segments into display segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct MergeConfig {
    pub max_seconds: f64,
    pub max_chars: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_seconds: 10.0,
            max_chars: 520,
        }
    }
}

/// Settings for a whole narration run.
///
/// Every field has a default, so a JSON config file only needs the keys it
/// wants to override:
///
/// ```json
/// { "voice": "en-us", "speed": 1.1, "align": { "threshold": 80 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct NarrationConfig {
    pub voice: String,
    /// Speech speed multiplier passed to the synthesizer.
    pub speed: f32,
    /// Character budget per synthesis request. Keep this safely below the
    /// engine's hard input limit.
    pub chunk_max_chars: usize,
    pub merge: MergeConfig,
    pub align: AlignConfig,
    /// Synthesize and recognize chunks concurrently.
    pub parallel_chunks: bool,
    pub mp3_bitrate_kbps: u32,
    /// Largest accepted upload, in bytes.
    pub max_document_bytes: usize,
    /// Seconds an external engine may run per chunk; 0 waits forever.
    pub engine_timeout_secs: u64,
}

impl NarrationConfig {
    pub const DEFAULT_CHUNK_MAX_CHARS: usize = 3600;
    pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 2 * 1024 * 1024;
    pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 600;

    /// Per-call limit for external engine programs.
    pub fn engine_timeout(&self) -> Option<Duration> {
        (self.engine_timeout_secs > 0).then(|| Duration::from_secs(self.engine_timeout_secs))
    }

    /// Load a config from a JSON file, filling missing keys with defaults.
    pub fn load(path: &Path) -> Result<Self, NarrationError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| NarrationError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NarrationError> {
        if self.chunk_max_chars == 0 {
            return Err(NarrationError::config("chunk_max_chars must be positive"));
        }
        if !(0.25..=4.0).contains(&self.speed) {
            return Err(NarrationError::config(format!(
                "speed {} is outside 0.25..=4.0",
                self.speed
            )));
        }
        if self.merge.max_seconds <= 0.0 || self.merge.max_chars == 0 {
            return Err(NarrationError::config(
                "merge.max_seconds and merge.max_chars must be positive",
            ));
        }
        if self.align.threshold > 100 {
            return Err(NarrationError::config(format!(
                "align.threshold {} is above 100",
                self.align.threshold
            )));
        }
        if self.voice.trim().is_empty() {
            return Err(NarrationError::config("voice must not be empty"));
        }
        Ok(())
    }
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            voice: "en-us".to_string(),
            speed: 1.0,
            chunk_max_chars: Self::DEFAULT_CHUNK_MAX_CHARS,
            merge: MergeConfig::default(),
            align: AlignConfig::default(),
            parallel_chunks: false,
            mp3_bitrate_kbps: 64,
            max_document_bytes: Self::DEFAULT_MAX_DOCUMENT_BYTES,
            engine_timeout_secs: Self::DEFAULT_ENGINE_TIMEOUT_SECS,
        }
    }
}
