//! Maps transcribed segments back onto the chunk text they were spoken from.
//!
//! Matching happens in the normalized alphabet (see [`crate::normalize`]).
//! A forward-only cursor bounds every search to a window around the
//! previous match: an exact substring search runs first, then a fixed-stride
//! fuzzy scan. Segments that score below the threshold stay unaligned.

pub mod similarity;

use serde::{Deserialize, Serialize};

use crate::config::AlignConfig;
use crate::normalize::{normalize, normalize_for_match, Normalized};
use crate::segments::{AlignedSegment, MergedSegment, TextSpan};

/// A fuzzy score at or above this ends the scan early.
const EARLY_EXIT_SCORE: u8 = 96;

/// An accepted match, in chunk-text char coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub orig_start: usize,
    pub orig_end: usize,
    /// Start of the match in normalized coordinates.
    pub norm_start: usize,
    /// End of the match in normalized coordinates; the new cursor.
    pub norm_end: usize,
    pub score: u8,
}

/// Find `query` in `source` near `cursor`.
///
/// `floor` is the lowest normalized position a match may start at; it keeps
/// the lookback from re-matching text an earlier segment already claimed.
pub fn find_best_match(
    source: &Normalized,
    query: &[char],
    cursor: usize,
    floor: usize,
    config: &AlignConfig,
) -> Option<Match> {
    if query.is_empty() || query.len() < config.min_query_len {
        return None;
    }

    let len = query.len();
    let window_start = cursor.saturating_sub(config.lookback).max(floor);
    let window_end = source.len().min(cursor.saturating_add(config.ahead));
    if window_end < window_start || window_end - window_start < len {
        return None;
    }
    let window = &source.text[window_start..window_end];

    let accept = |norm_start: usize, score: u8| Match {
        orig_start: source.map[norm_start],
        orig_end: source.map[norm_start + len - 1] + 1,
        norm_start,
        norm_end: norm_start + len,
        score,
    };

    if let Some(pos) = window.windows(len).position(|w| w == query) {
        return Some(accept(window_start + pos, 100));
    }

    let stride = (len / 6).max(1);
    let mut best: Option<(usize, u8)> = None;
    for offset in (0..=window.len() - len).step_by(stride) {
        let score = similarity::ratio(query, &window[offset..offset + len]);
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((window_start + offset, score));
            if score >= EARLY_EXIT_SCORE {
                break;
            }
        }
    }

    match best {
        Some((norm_start, score)) if score >= config.threshold => Some(accept(norm_start, score)),
        _ => None,
    }
}

/// Aligns the merged segments of one chunk against that chunk's text.
#[derive(Debug, Clone, Default)]
pub struct Aligner {
    config: AlignConfig,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Align `segments` (in temporal order) to `chunk_text`.
    ///
    /// Returned spans are chunk-local char offsets. The cursor starts at the
    /// beginning of the chunk for every call.
    pub fn align_chunk(
        &self,
        chunk_text: &str,
        segments: Vec<MergedSegment>,
    ) -> Vec<AlignedSegment> {
        let source = normalize(chunk_text);
        if source.is_empty() {
            return segments.into_iter().map(AlignedSegment::unaligned).collect();
        }
        let chunk_chars: Vec<char> = chunk_text.chars().collect();

        let mut cursor = 0usize;
        let mut floor = 0usize;
        let mut aligned = Vec::with_capacity(segments.len());

        for segment in segments {
            let query: Vec<char> = normalize_for_match(segment.text.trim()).chars().collect();

            let Some(found) = find_best_match(&source, &query, cursor, floor, &self.config) else {
                cursor = source.len().min(cursor + (query.len() / 3).max(1));
                log::debug!(
                    "No match for segment at {:.2}s ({} chars), cursor -> {cursor}",
                    segment.start,
                    query.len()
                );
                aligned.push(AlignedSegment::unaligned(segment));
                continue;
            };

            cursor = found.norm_end;
            floor = found.norm_start + 1;
            let span = TextSpan {
                orig_char_start: found.orig_start,
                orig_char_end: extend_over_punctuation(&chunk_chars, found.orig_end),
                align_score: found.score,
            };
            log::debug!(
                "Segment at {:.2}s -> chars {}..{} (score {})",
                segment.start,
                span.orig_char_start,
                span.orig_char_end,
                span.align_score
            );
            aligned.push(AlignedSegment {
                start: segment.start,
                end: segment.end,
                text: segment.text,
                alignment: Some(span),
            });
        }

        aligned
    }
}

/// Move `end` past punctuation directly after the match, so a matched
/// sentence keeps its closing mark.
fn extend_over_punctuation(chars: &[char], mut end: usize) -> usize {
    while end < chars.len() && !chars[end].is_alphanumeric() && !chars[end].is_whitespace() {
        end += 1;
    }
    end
}

/// How much of a narration could be mapped back onto its text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentStats {
    pub total_segments: usize,
    pub aligned_segments: usize,
    pub unaligned_segments: usize,
    /// Mean score of aligned segments; `None` when nothing aligned.
    pub mean_score: Option<f64>,
    /// Document chars covered by at least one aligned span.
    pub covered_chars: usize,
}

impl AlignmentStats {
    pub fn from_segments(segments: &[AlignedSegment]) -> Self {
        let mut spans: Vec<TextSpan> = segments.iter().filter_map(|s| s.alignment).collect();
        spans.sort_by_key(|s| s.orig_char_start);

        let mut covered_chars = 0;
        let mut covered_to = 0;
        for span in &spans {
            let start = span.orig_char_start.max(covered_to);
            if span.orig_char_end > start {
                covered_chars += span.orig_char_end - start;
                covered_to = span.orig_char_end;
            }
        }

        let mean_score = if spans.is_empty() {
            None
        } else {
            let sum: f64 = spans.iter().map(|s| s.align_score as f64).sum();
            Some(sum / spans.len() as f64)
        };

        Self {
            total_segments: segments.len(),
            aligned_segments: spans.len(),
            unaligned_segments: segments.len() - spans.len(),
            mean_score,
            covered_chars,
        }
    }
}
