use serde::{Deserialize, Serialize};

/// A timestamped span of transcribed speech, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A segment as returned by the recognizer, in chunk-local time.
pub type RawSegment = Segment;

/// A segment coalesced from consecutive raw segments for display.
pub type MergedSegment = Segment;

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Where a segment landed in the original document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    /// Inclusive char offset into the document (chunk text while local).
    pub orig_char_start: usize,
    /// Exclusive char offset into the document (chunk text while local).
    pub orig_char_end: usize,
    /// Match quality, 0-100; 100 for a verbatim match.
    pub align_score: u8,
}

impl TextSpan {
    pub(crate) fn shifted(self, chars: usize) -> Self {
        Self {
            orig_char_start: self.orig_char_start + chars,
            orig_char_end: self.orig_char_end + chars,
            ..self
        }
    }
}

/// A merged segment plus its text span, when one was found.
///
/// Serializes flat: the span fields only appear for aligned segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(flatten)]
    pub alignment: Option<TextSpan>,
}

impl AlignedSegment {
    pub fn unaligned(segment: MergedSegment) -> Self {
        Self {
            start: segment.start,
            end: segment.end,
            text: segment.text,
            alignment: None,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.alignment.is_some()
    }
}

/// Coalesce consecutive segments while the merged span stays within
/// `max_seconds` and its text within `max_chars` chars.
///
/// Segments with blank text are dropped first. A single segment that is
/// already over either bound is passed through, never split.
pub fn merge(raw: &[RawSegment], max_seconds: f64, max_chars: usize) -> Vec<MergedSegment> {
    let mut merged: Vec<MergedSegment> = Vec::new();
    let mut current: Option<(MergedSegment, usize)> = None;

    for segment in raw {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        let text_chars = text.chars().count();

        if let Some((running, running_chars)) = current.as_mut() {
            let joined_chars = *running_chars + 1 + text_chars;
            if segment.end - running.start <= max_seconds && joined_chars <= max_chars {
                running.end = segment.end;
                running.text.push(' ');
                running.text.push_str(text);
                *running_chars = joined_chars;
                continue;
            }
        }

        if let Some((done, _)) = current.take() {
            merged.push(done);
        }
        current = Some((Segment::new(segment.start, segment.end, text), text_chars));
    }

    if let Some((done, _)) = current {
        merged.push(done);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> RawSegment {
        Segment::new(start, end, text)
    }

    #[test]
    fn merges_until_duration_bound() {
        let raw = vec![
            seg(0.0, 3.0, "one"),
            seg(3.0, 6.0, "two"),
            seg(6.0, 9.5, "three"),
            seg(9.5, 12.0, "four"),
        ];
        let merged = merge(&raw, 10.0, 520);
        assert_eq!(
            merged,
            vec![seg(0.0, 9.5, "one two three"), seg(9.5, 12.0, "four")]
        );
    }

    #[test]
    fn merges_until_char_bound() {
        let raw = vec![seg(0.0, 1.0, "abcd"), seg(1.0, 2.0, "efgh"), seg(2.0, 3.0, "ij")];
        let merged = merge(&raw, 10.0, 9);
        assert_eq!(merged, vec![seg(0.0, 2.0, "abcd efgh"), seg(2.0, 3.0, "ij")]);
    }

    #[test]
    fn drops_blank_and_trims_text() {
        let raw = vec![seg(0.0, 1.0, "  hi "), seg(1.0, 2.0, "   "), seg(2.0, 3.0, "there\n")];
        assert_eq!(merge(&raw, 10.0, 520), vec![seg(0.0, 3.0, "hi there")]);
        assert!(merge(&[seg(0.0, 1.0, "")], 10.0, 520).is_empty());
    }

    #[test]
    fn oversized_segment_passes_through() {
        let raw = vec![seg(0.0, 15.0, "long monologue"), seg(15.0, 16.0, "short")];
        let merged = merge(&raw, 10.0, 520);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].duration(), 15.0);
    }

    #[test]
    fn merge_is_idempotent() {
        let raw: Vec<RawSegment> = (0..40)
            .map(|i| {
                let start = i as f64 * 1.7;
                seg(start, start + 1.6, &"word ".repeat(i % 7 + 1))
            })
            .collect();
        for (secs, chars) in [(10.0, 520), (4.0, 30), (2.0, 12), (100.0, 10_000)] {
            let once = merge(&raw, secs, chars);
            assert_eq!(merge(&once, secs, chars), once);
        }
    }

    #[test]
    fn aligned_segment_serializes_span_only_when_present() {
        let unaligned = AlignedSegment::unaligned(seg(1.0, 2.0, "x"));
        let json = serde_json::to_value(&unaligned).unwrap();
        assert!(json.get("orig_char_start").is_none());

        let aligned = AlignedSegment {
            alignment: Some(TextSpan {
                orig_char_start: 4,
                orig_char_end: 9,
                align_score: 100,
            }),
            ..unaligned
        };
        let json = serde_json::to_string(&aligned).unwrap();
        assert!(json.contains("\"orig_char_start\":4"));
        let back: AlignedSegment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, aligned);

        let plain: AlignedSegment =
            serde_json::from_str(r#"{"start":0.0,"end":1.0,"text":"y"}"#).unwrap();
        assert!(!plain.is_aligned());
    }
}
