use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::tokens::{tokenize, tokens_within, Token};
use crate::zone::EditableWindow;

static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?…\n]+[.!?…]*").expect("sentence regex"));

/// A sentence of the script: trimmed byte bounds plus the token indices it covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
    pub tokens: Range<usize>,
    pub signature: String,
}

impl Sentence {
    #[must_use]
    pub fn bytes(&self) -> Range<usize> {
        self.start..self.end
    }

    #[must_use]
    pub fn word_count(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// First two normalized words, used for repeated-opening statistics.
    #[must_use]
    pub fn opening(&self) -> String {
        self.signature
            .split(' ')
            .take(2)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Normalized signature of arbitrary text: its folded tokens joined by spaces.
#[must_use]
pub fn signature(text: &str) -> String {
    tokenize(text)
        .into_iter()
        .map(|t| t.normalized)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits on terminal punctuation and newlines. Pieces without any word are dropped.
#[must_use]
pub fn segment(text: &str, tokens: &[Token]) -> Vec<Sentence> {
    let mut out = Vec::new();
    for m in SENTENCE_RE.find_iter(text) {
        let raw = m.as_str();
        let lead = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let start = m.start() + lead;
        let end = start + trimmed.len();
        let idx = tokens_within(tokens, start..end);
        if idx.is_empty() {
            continue;
        }
        let signature = tokens[idx.clone()]
            .iter()
            .map(|t| t.normalized.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        out.push(Sentence {
            start,
            end,
            tokens: idx,
            signature,
        });
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DuplicateParams {
    pub jaccard: f64,
    pub max_len_diff: usize,
    pub min_tokens: usize,
}

impl Default for DuplicateParams {
    fn default() -> Self {
        Self {
            jaccard: 0.86,
            max_len_diff: 4,
            min_tokens: 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    Exact,
    /// Same leading content words as an earlier sentence.
    Core,
    Near,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Duplicate {
    /// Index into the sentence list of the flagged (later) sentence.
    pub sentence: usize,
    /// Index of the earlier sentence it repeats.
    pub original: usize,
    pub kind: DuplicateKind,
    pub similarity: f64,
}

#[must_use]
pub fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    inter as f64 / union as f64
}

fn token_set(sig: &str) -> BTreeSet<&str> {
    sig.split(' ').filter(|w| !w.is_empty()).collect()
}

const CORE_STOPWORDS: &[&str] = &[
    "il", "lo", "la", "i", "gli", "le", "un", "una", "e", "ed", "di", "da", "a", "in", "con",
    "su", "per", "che", "non", "piu", "meno", "nel", "nella", "della", "delle", "del", "dei",
    "degli", "al", "alla",
];
const CORE_WORDS: usize = 10;

/// The first ten content words of a signature: words longer than two characters that are
/// not function words.
#[must_use]
pub fn core_signature(signature: &str) -> String {
    signature
        .split(' ')
        .filter(|w| w.chars().count() > 2 && !CORE_STOPWORDS.contains(w))
        .take(CORE_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Flags duplicates against every earlier sentence in document order: exact signature
/// matches, then equal core signatures, then near matches by Jaccard similarity.
///
/// Sentences shorter than `min_tokens` are ignored entirely. Sentences not fully inside
/// `window` still join the seen set but are never flagged; with no window every
/// sentence is protected.
#[must_use]
pub fn find_duplicates(
    sentences: &[Sentence],
    params: &DuplicateParams,
    window: Option<&EditableWindow>,
) -> Vec<Duplicate> {
    let mut seen_exact: HashMap<&str, usize> = HashMap::new();
    let mut seen_core: HashMap<String, usize> = HashMap::new();
    let mut seen: Vec<(usize, BTreeSet<&str>, usize)> = Vec::new();
    let mut out = Vec::new();

    for (i, s) in sentences.iter().enumerate() {
        if s.word_count() < params.min_tokens.max(1) {
            continue;
        }
        let editable = window.is_some_and(|w| w.allows_bytes(s.start, s.end));
        let set = token_set(&s.signature);
        let core = core_signature(&s.signature);

        if editable {
            if let Some(&orig) = seen_exact.get(s.signature.as_str()) {
                out.push(Duplicate {
                    sentence: i,
                    original: orig,
                    kind: DuplicateKind::Exact,
                    similarity: 1.0,
                });
            } else if let Some(&orig) = seen_core.get(&core).filter(|_| !core.is_empty()) {
                out.push(Duplicate {
                    sentence: i,
                    original: orig,
                    kind: DuplicateKind::Core,
                    similarity: jaccard(&set, &token_set(&sentences[orig].signature)),
                });
            } else {
                let wc = s.word_count();
                let near = seen.iter().find_map(|(j, other, other_wc)| {
                    if wc.abs_diff(*other_wc) > params.max_len_diff {
                        return None;
                    }
                    let sim = jaccard(&set, other);
                    (sim >= params.jaccard).then_some((*j, sim))
                });
                if let Some((orig, sim)) = near {
                    out.push(Duplicate {
                        sentence: i,
                        original: orig,
                        kind: DuplicateKind::Near,
                        similarity: sim,
                    });
                }
            }
        }

        seen_exact.entry(s.signature.as_str()).or_insert(i);
        if !core.is_empty() {
            seen_core.entry(core).or_insert(i);
        }
        seen.push((i, set, s.word_count()));
    }
    out
}
