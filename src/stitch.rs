//! Places per-chunk results on the document-wide timeline.

use crate::chunker::Chunk;
use crate::manifest::ChunkManifestEntry;
use crate::segments::AlignedSegment;
use crate::SynthesizedAudio;

/// Everything produced for one chunk, in chunk-local coordinates.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub chunk: Chunk,
    pub audio: SynthesizedAudio,
    /// Times relative to the chunk audio, spans relative to the chunk text.
    pub segments: Vec<AlignedSegment>,
}

/// Chunk results lifted into global time and document offsets.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub segments: Vec<AlignedSegment>,
    pub chunks: Vec<ChunkManifestEntry>,
    /// Chunk WAVs in playback order.
    pub wavs: Vec<Vec<u8>>,
}

impl Timeline {
    pub fn total_duration_secs(&self) -> f64 {
        self.chunks.iter().map(|c| c.duration_seconds).sum()
    }
}

/// Shift every chunk's segments by the audio played before it and by the
/// chunk's start in the document.
///
/// Outcomes may arrive in any order; they are placed by chunk index.
pub fn accumulate(mut outcomes: Vec<ChunkOutcome>) -> Timeline {
    outcomes.sort_by_key(|o| o.chunk.index);

    let mut timeline = Timeline::default();
    let mut offset = 0.0f64;

    for outcome in outcomes {
        let ChunkOutcome {
            chunk,
            audio,
            segments,
        } = outcome;

        timeline
            .segments
            .extend(segments.into_iter().map(|segment| AlignedSegment {
                start: segment.start + offset,
                end: segment.end + offset,
                text: segment.text,
                alignment: segment.alignment.map(|span| span.shifted(chunk.orig_start)),
            }));

        timeline.chunks.push(ChunkManifestEntry {
            index: chunk.index,
            orig_char_start: chunk.orig_start,
            orig_char_end: chunk.orig_end,
            chars: chunk.char_len(),
            duration_seconds: audio.duration_secs,
            audio_offset_seconds: offset,
        });
        log::debug!(
            "Chunk {} placed at {offset:.3}s ({:.3}s long)",
            chunk.index,
            audio.duration_secs
        );

        offset += audio.duration_secs;
        timeline.wavs.push(audio.wav);
    }

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::TextSpan;

    fn outcome(index: usize, orig_start: usize, text: &str, seconds: f64) -> ChunkOutcome {
        let segments = vec![
            AlignedSegment {
                start: 0.0,
                end: seconds / 2.0,
                text: "first half".to_string(),
                alignment: Some(TextSpan {
                    orig_char_start: 0,
                    orig_char_end: 4,
                    align_score: 100,
                }),
            },
            AlignedSegment {
                start: seconds / 2.0,
                end: seconds,
                text: "noise".to_string(),
                alignment: None,
            },
        ];
        ChunkOutcome {
            chunk: Chunk {
                index,
                text: text.to_string(),
                orig_start,
                orig_end: orig_start + text.chars().count(),
            },
            audio: SynthesizedAudio {
                wav: vec![index as u8],
                duration_secs: seconds,
            },
            segments,
        }
    }

    #[test]
    fn later_chunks_start_after_all_earlier_audio() {
        let timeline = accumulate(vec![
            outcome(0, 0, "zero zero", 2.0),
            outcome(1, 11, "one one", 3.5),
            outcome(2, 20, "two", 1.0),
        ]);

        let offsets: Vec<f64> = timeline.chunks.iter().map(|c| c.audio_offset_seconds).collect();
        assert_eq!(offsets, vec![0.0, 2.0, 5.5]);
        assert_eq!(timeline.total_duration_secs(), 6.5);

        let third_chunk_first = &timeline.segments[4];
        assert!(third_chunk_first.start >= 2.0 + 3.5);
        let span = third_chunk_first.alignment.unwrap();
        assert_eq!((span.orig_char_start, span.orig_char_end), (20, 24));

        assert!(timeline.segments[3].alignment.is_none());
        assert_eq!(timeline.segments[3].end, 5.5);
    }

    #[test]
    fn completion_order_does_not_matter() {
        let timeline = accumulate(vec![
            outcome(2, 20, "two", 1.0),
            outcome(0, 0, "zero zero", 2.0),
            outcome(1, 11, "one one", 3.5),
        ]);
        let indices: Vec<usize> = timeline.chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(timeline.wavs, vec![vec![0u8], vec![1], vec![2]]);
        assert_eq!(timeline.chunks[2].audio_offset_seconds, 5.5);
        assert_eq!(timeline.chunks[1].chars, 7);
    }

    #[test]
    fn segment_times_never_decrease() {
        let timeline = accumulate(vec![outcome(0, 0, "a b c", 4.0), outcome(1, 6, "d e f", 4.0)]);
        for pair in timeline.segments.windows(2) {
            assert!(pair[1].start >= pair[0].start);
        }
    }
}
