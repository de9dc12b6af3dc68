//! Splits a document into synthesis-sized chunks that keep their exact
//! position in the original text.
//!
//! Offsets are char indices, not byte offsets.

use serde::{Deserialize, Serialize};

use crate::error::NarrationError;

/// A sentence break is only used when it falls at or after this share of
/// the window; earlier breaks would produce needlessly short chunks.
const SENTENCE_CUT_MIN_PERCENT: usize = 55;

/// A contiguous slice of the document, `[orig_start, orig_end)` in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub orig_start: usize,
    pub orig_end: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.orig_end - self.orig_start
    }
}

/// Split `text` into ordered chunks of at most `max_chars` chars.
///
/// Paragraphs (separated by two or more newlines, the separator staying
/// with the preceding paragraph) are packed greedily. A paragraph that is
/// too long on its own is cut at a sentence end, then at a space, then
/// hard. Whitespace-only chunks are dropped.
pub fn split(text: &str, max_chars: usize) -> Result<Vec<Chunk>, NarrationError> {
    if max_chars == 0 {
        return Err(NarrationError::config("chunk budget must be positive"));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (p_start, p_end) in paragraph_spans(&chars) {
        if p_end - p_start > max_chars {
            spans.extend(current.take());
            split_long_paragraph(&chars, p_start, p_end, max_chars, &mut spans);
            continue;
        }

        current = match current {
            None => Some((p_start, p_end)),
            Some((c_start, _)) if p_end - c_start <= max_chars => Some((c_start, p_end)),
            Some(full) => {
                spans.push(full);
                Some((p_start, p_end))
            }
        };
    }
    spans.extend(current);

    let chunks: Vec<Chunk> = spans
        .into_iter()
        .filter(|&(start, end)| chars[start..end].iter().any(|c| !c.is_whitespace()))
        .enumerate()
        .map(|(index, (start, end))| Chunk {
            index,
            text: chars[start..end].iter().collect(),
            orig_start: start,
            orig_end: end,
        })
        .collect();

    log::debug!(
        "Split {} chars into {} chunks (budget {max_chars})",
        chars.len(),
        chunks.len()
    );
    Ok(chunks)
}

/// Paragraph spans covering the whole text; each run of 2+ newlines ends
/// the span before it.
fn paragraph_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\n' {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < chars.len() && chars[i] == '\n' {
            i += 1;
        }
        if i - run_start >= 2 {
            spans.push((start, i));
            start = i;
        }
    }

    if start < chars.len() {
        spans.push((start, chars.len()));
    }
    spans
}

fn split_long_paragraph(
    chars: &[char],
    start: usize,
    end: usize,
    max_chars: usize,
    spans: &mut Vec<(usize, usize)>,
) {
    let min_sentence_cut = max_chars * SENTENCE_CUT_MIN_PERCENT / 100;
    let mut i = start;

    while i < end {
        let j = (i + max_chars).min(end);
        if j == end {
            spans.push((i, end));
            break;
        }

        let window = &chars[i..j];
        let cut = last_sentence_break(window)
            .filter(|&pos| pos >= min_sentence_cut)
            .map(|pos| pos + 2)
            .or_else(|| window.iter().rposition(|&c| c == ' ').map(|pos| pos + 1))
            .unwrap_or(window.len());

        spans.push((i, i + cut));
        i += cut;
    }
}

/// Position of the `.` in the last `". "` of the window.
fn last_sentence_break(window: &[char]) -> Option<usize> {
    window.windows(2).rposition(|pair| pair == ['.', ' '])
}
