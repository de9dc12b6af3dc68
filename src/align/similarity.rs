/// Normalized Indel similarity of two char sequences, 0-100.
///
/// `2 * LCS / (|a| + |b|)` scaled to 100 and truncated, so only identical
/// sequences score 100. Either side empty scores 0.
pub fn ratio(a: &[char], b: &[char]) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let lcs = lcs_len(a, b);
    (200 * lcs / (a.len() + b.len())) as u8
}

/// Length of the longest common subsequence, single-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut row = vec![0usize; inner.len() + 1];

    for &ca in outer {
        let mut diag = 0;
        for (j, &cb) in inner.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if ca == cb { diag + 1 } else { up.max(row[j]) };
            diag = up;
        }
    }

    row[inner.len()]
}
