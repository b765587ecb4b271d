use std::collections::BTreeSet;

use veridoc_core::FieldName;

/// Levenshtein edit distance over characters, two-row O(min(m,n)) space.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop.
    let (a, b, _m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalized edit similarity in [0, 1]. Two empty strings are identical.
pub fn edit_similarity(s1: &str, s2: &str) -> f64 {
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(s1, s2) as f64 / max_len as f64
}

/// Word-set overlap (Jaccard) in [0, 1]; insensitive to word order, which
/// matters for multi-word fields like addresses.
pub fn token_overlap(s1: &str, s2: &str) -> f64 {
    let set1: BTreeSet<&str> = s1.split_whitespace().collect();
    let set2: BTreeSet<&str> = s2.split_whitespace().collect();
    if set1.is_empty() && set2.is_empty() {
        return 1.0;
    }
    let intersection = set1.intersection(&set2).count() as f64;
    let union = set1.union(&set2).count() as f64;
    intersection / union
}

/// Uppercase, keep alphanumerics, collapse runs of anything else to a
/// single space.
fn normalize_fuzzy(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_uppercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Strip everything but alphanumerics, uppercased. Structured numeric
/// fields compare on this form only.
fn normalize_exact(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Field-aware similarity in [0, 1]. Symmetric in its two value arguments
/// by construction: every branch applies the same normalization to both
/// sides and uses a symmetric measure.
pub fn field_similarity(field: FieldName, a: &str, b: &str) -> f64 {
    if field.is_exact_match() {
        return if normalize_exact(a) == normalize_exact(b) { 1.0 } else { 0.0 };
    }

    let na = normalize_fuzzy(a);
    let nb = normalize_fuzzy(b);
    let edit = edit_similarity(&na, &nb);
    if field.is_multi_word() {
        edit.max(token_overlap(&na, &nb))
    } else {
        edit
    }
}
