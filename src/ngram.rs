use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::tokens::Token;

/// A normalized n-gram and every token index where it starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NgramRecord {
    pub key: String,
    pub positions: Vec<usize>,
}

impl NgramRecord {
    #[must_use]
    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgramCount {
    pub ngram: String,
    pub count: usize,
}

/// Window size and the occurrence count at which an n-gram counts as repeated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NgramParams {
    pub size: usize,
    pub threshold: usize,
}

impl Default for NgramParams {
    fn default() -> Self {
        Self {
            size: 3,
            threshold: 3,
        }
    }
}

#[must_use]
pub fn ngram_key(tokens: &[Token], start: usize, n: usize) -> String {
    tokens[start..start + n]
        .iter()
        .map(|t| t.normalized.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[must_use]
pub fn index(tokens: &[Token], n: usize) -> BTreeMap<String, Vec<usize>> {
    let mut map: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    if n == 0 || tokens.len() < n {
        return map;
    }
    for start in 0..=tokens.len() - n {
        map.entry(ngram_key(tokens, start, n)).or_default().push(start);
    }
    map
}

/// N-grams occurring at least `threshold` times, most frequent first, ties by key.
#[must_use]
pub fn repeated_records(tokens: &[Token], n: usize, threshold: usize) -> Vec<NgramRecord> {
    let mut out: Vec<NgramRecord> = index(tokens, n)
        .into_iter()
        .filter(|(_, positions)| positions.len() >= threshold.max(1))
        .map(|(key, positions)| NgramRecord { key, positions })
        .collect();
    out.sort_by(|a, b| b.count().cmp(&a.count()).then_with(|| a.key.cmp(&b.key)));
    out
}

#[must_use]
pub fn find_repeated(tokens: &[Token], n: usize, threshold: usize, top: usize) -> Vec<NgramCount> {
    repeated_records(tokens, n, threshold)
        .into_iter()
        .take(top)
        .map(|r| NgramCount {
            count: r.count(),
            ngram: r.key,
        })
        .collect()
}

#[must_use]
pub fn repeated_keys(tokens: &[Token], n: usize, threshold: usize) -> BTreeSet<String> {
    repeated_records(tokens, n, threshold)
        .into_iter()
        .map(|r| r.key)
        .collect()
}

/// True when `after` has a repeated n-gram that `before` did not have.
#[must_use]
pub fn introduces_repeats(before: &[Token], after: &[Token], params: NgramParams) -> bool {
    let old = repeated_keys(before, params.size, params.threshold);
    repeated_keys(after, params.size, params.threshold)
        .iter()
        .any(|k| !old.contains(k))
}

#[must_use]
pub fn count_of(tokens: &[Token], key: &str, n: usize) -> usize {
    if n == 0 || tokens.len() < n {
        return 0;
    }
    (0..=tokens.len() - n)
        .filter(|&start| ngram_key(tokens, start, n) == key)
        .count()
}

/// Share of n-gram occurrences whose n-gram appears at least twice.
/// Texts shorter than three windows score 0.
#[must_use]
pub fn repeated_token_ratio(tokens: &[Token], n: usize) -> f64 {
    if n == 0 || tokens.len() < n * 3 {
        return 0.0;
    }
    let map = index(tokens, n);
    let total: usize = map.values().map(Vec::len).sum();
    let repeated: usize = map.values().map(Vec::len).filter(|c| *c >= 2).sum();
    if total == 0 {
        return 0.0;
    }
    repeated as f64 / total as f64
}

/// Keys of every n-gram window of `tokens`, in order.
#[must_use]
pub fn window_keys(tokens: &[Token], n: usize) -> Vec<String> {
    if n == 0 || tokens.len() < n {
        return Vec::new();
    }
    (0..=tokens.len() - n).map(|s| ngram_key(tokens, s, n)).collect()
}

/// Token indices touching `bytes`, widened by `n - 1` on both sides.
fn around(tokens: &[Token], bytes: Range<usize>, n: usize) -> Range<usize> {
    let lo = tokens.partition_point(|t| t.end < bytes.start);
    let hi = tokens.partition_point(|t| t.start <= bytes.end);
    let pad = n.saturating_sub(1);
    lo.saturating_sub(pad)..(hi + pad).min(tokens.len())
}

/// N-gram counts of a text, kept so a local edit can be checked against the repeat
/// threshold without re-indexing the whole text.
#[derive(Clone, Debug, Default)]
pub struct NgramTally {
    params: NgramParams,
    counts: BTreeMap<String, usize>,
}

impl NgramTally {
    #[must_use]
    pub fn new(tokens: &[Token], params: NgramParams) -> Self {
        let counts = index(tokens, params.size)
            .into_iter()
            .map(|(key, positions)| (key, positions.len()))
            .collect();
        Self { params, counts }
    }

    #[must_use]
    pub fn params(&self) -> NgramParams {
        self.params
    }

    #[must_use]
    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// True when trading the `removed` occurrences for the `added` ones brings an n-gram
    /// from below the threshold to the threshold or above.
    #[must_use]
    pub fn lifts(&self, removed: &[String], added: &[String]) -> bool {
        let mut delta: BTreeMap<&str, isize> = BTreeMap::new();
        for k in removed {
            *delta.entry(k.as_str()).or_insert(0) -= 1;
        }
        for k in added {
            *delta.entry(k.as_str()).or_insert(0) += 1;
        }
        let thr = self.params.threshold.max(1);
        delta.into_iter().any(|(key, d)| {
            let before = self.count(key);
            before < thr && before as isize + d >= thr as isize
        })
    }

    /// [`Self::lifts`] for a splice: bytes `old` of the text behind `before` became bytes
    /// `new` of the text behind `after`. Only windows near the edit are compared.
    #[must_use]
    pub fn lifts_splice(
        &self,
        before: &[Token],
        old: Range<usize>,
        after: &[Token],
        new: Range<usize>,
    ) -> bool {
        let n = self.params.size;
        let removed = window_keys(&before[around(before, old, n)], n);
        let added = window_keys(&after[around(after, new, n)], n);
        self.lifts(&removed, &added)
    }

    pub fn record(&mut self, removed: &[String], added: &[String]) {
        for k in removed {
            if let Some(c) = self.counts.get_mut(k) {
                *c = c.saturating_sub(1);
            }
        }
        for k in added {
            *self.counts.entry(k.clone()).or_insert(0) += 1;
        }
    }
}
