//! Canonical matching alphabet for source text and transcripts.
//!
//! Both sides are lowercased, punctuation and whitespace runs collapse to a
//! single space, and words hyphenated across a line break are rejoined. The
//! source side additionally keeps, for every normalized char, the char index
//! in the original text that produced it.

/// Normalized text plus its back-reference into the original text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub text: Vec<char>,
    /// `map[i]` is the char index in the original text behind `text[i]`.
    pub map: Vec<usize>,
}

impl Normalized {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_string(&self) -> String {
        self.text.iter().collect()
    }
}

/// Normalize `text`, recording the original position of every output char.
pub fn normalize(text: &str) -> Normalized {
    let mut out = Normalized::default();
    scan(text, |ch, pos| {
        out.text.push(ch);
        out.map.push(pos);
    });
    out
}

/// Same transform as [`normalize`] without the position map, for transcript
/// text that is never mapped back.
pub fn normalize_for_match(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    scan(text, |ch, _| out.push(ch));
    out
}

/// Drive `emit` with the normalized chars of `text`.
///
/// A separator run is held back as a pending space and only emitted once
/// another alphanumeric follows, so the output never starts or ends with a
/// space and never contains two in a row.
fn scan(text: &str, mut emit: impl FnMut(char, usize)) {
    let chars: Vec<char> = text.chars().collect();
    let mut pending_space: Option<usize> = None;
    let mut emitted_any = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '-' && matches!(chars.get(i + 1), Some('\n' | '\r')) {
            i += 1;
            while i < chars.len() && matches!(chars[i], '\r' | '\n' | ' ' | '\t') {
                i += 1;
            }
            continue;
        }

        if ch.is_alphanumeric() {
            if let Some(pos) = pending_space.take() {
                emit(' ', pos);
            }
            for lower in ch.to_lowercase() {
                emit(lower, i);
            }
            emitted_any = true;
        } else if emitted_any && pending_space.is_none() {
            pending_space = Some(i);
        }

        i += 1;
    }
}
