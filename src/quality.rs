use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ngram::repeated_token_ratio;
use crate::sentences::{segment, Sentence};
use crate::tables::RewriteTables;
use crate::textutil::clean_for_match;
use crate::tokens::tokenize;

/// Sentences with a shorter signature are ignored by the ratios (micro clauses repeat by
/// nature).
const MIN_SENTENCE_CHARS: usize = 20;
const HOOK_WORDS: usize = 30;
const MIN_OPENING_SENTENCES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityFlag {
    DupSentences,
    RepeatedTrigrams,
    RepeatedIncipit,
    LazyPhrases,
    MissingPromise,
    MissingProblem,
    MicroNarrationWeak,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub sentence_count: usize,
    pub token_count: usize,
    pub dup_sentence_ratio: f64,
    pub repeated_trigram_ratio: f64,
    pub repeated_opening_ratio: f64,
    pub lazy_phrase_hits: usize,
    pub lazy_phrase_matched: Vec<String>,
    pub has_problem: bool,
    pub has_promise: bool,
    pub micro_narration_ok: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub score: u8,
    pub flags: Vec<QualityFlag>,
    pub metrics: QualityMetrics,
}

impl QualityReport {
    #[must_use]
    pub fn render_block(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();
        out.push_str("QUALITY:\n");
        out.push_str(&format!("- score: {}/100\n", self.score));
        out.push_str(&format!(
            "- sentences={} tokens={}\n",
            m.sentence_count, m.token_count
        ));
        out.push_str(&format!(
            "- ratios: dup={:.3} trigram={:.3} opening={:.3}\n",
            m.dup_sentence_ratio, m.repeated_trigram_ratio, m.repeated_opening_ratio
        ));
        if !m.lazy_phrase_matched.is_empty() {
            out.push_str("- lazy: ");
            out.push_str(&m.lazy_phrase_matched.join(" | "));
            out.push('\n');
        }
        if !self.flags.is_empty() {
            let flags: Vec<String> = self
                .flags
                .iter()
                .filter_map(|f| serde_json::to_value(f).ok())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            out.push_str("- flags: ");
            out.push_str(&flags.join(" | "));
            out.push('\n');
        }
        out.trim().to_string()
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn scored_sentences(text: &str) -> Vec<Sentence> {
    let tokens = tokenize(text);
    segment(text, &tokens)
        .into_iter()
        .filter(|s| s.signature.len() >= MIN_SENTENCE_CHARS)
        .collect()
}

fn duplicate_ratio(sentences: &[Sentence]) -> f64 {
    if sentences.is_empty() {
        return 0.0;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut dup = 0usize;
    for s in sentences {
        let c = seen.entry(s.signature.as_str()).or_insert(0);
        if *c > 0 {
            dup += 1;
        }
        *c += 1;
    }
    dup as f64 / sentences.len() as f64
}

fn opening_ratio(sentences: &[Sentence]) -> f64 {
    if sentences.len() < MIN_OPENING_SENTENCES {
        return 0.0;
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for s in sentences {
        *counts.entry(s.opening()).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f64 / sentences.len() as f64
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let p = clean_for_match(phrase);
    !p.is_empty() && format!(" {haystack} ").contains(&format!(" {p} "))
}

/// Problem and promise heuristics over the first words of the script.
#[must_use]
pub fn hook_signals(text: &str, tables: &RewriteTables) -> (bool, bool) {
    let tokens = tokenize(text);
    let head = tokens
        .iter()
        .take(HOOK_WORDS)
        .map(|t| t.normalized.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let q = &tables.quality;
    let has_problem = q.problem_keywords.iter().any(|k| head.contains(k.as_str()));
    let pattern = q.promise_pattern.as_ref().is_some_and(|re| re.is_match(&head));
    let benefit = q.benefit_keywords.iter().any(|k| head.contains(k.as_str()));
    (has_problem, pattern && benefit)
}

/// Deterministic score over the whole script. Identical text always yields an identical
/// report.
#[must_use]
pub fn score_script(text: &str, tables: &RewriteTables) -> QualityReport {
    let sentences = scored_sentences(text);
    let tokens = tokenize(text);
    let clean = clean_for_match(text);

    let dup = duplicate_ratio(&sentences);
    let rep3 = repeated_token_ratio(&tokens, 3);
    let opening = opening_ratio(&sentences);
    let lazy: Vec<String> = tables
        .quality
        .lazy_phrases
        .iter()
        .filter(|p| contains_phrase(&clean, p))
        .cloned()
        .collect();
    let (has_problem, has_promise) = hook_signals(text, tables);
    let micro_ok = if sentences.len() >= 3 {
        let first3: String = sentences[..3]
            .iter()
            .map(|s| s.text(text))
            .collect::<Vec<_>>()
            .join(" ");
        let markers: usize = tables
            .quality
            .micro_markers
            .iter()
            .map(|m| first3.matches(m.as_str()).count())
            .sum();
        markers < 2
    } else {
        false
    };

    let mut score: i64 = 100;
    score -= (dup * 90.0).round() as i64;
    score -= (rep3 * 80.0).round() as i64;
    score -= (opening * 50.0).round() as i64;
    score -= (lazy.len() as i64 * 6).min(20);
    if !has_promise {
        score -= 18;
    }
    if !micro_ok {
        score -= 12;
    }
    if !has_problem {
        score -= 10;
    }
    let score = score.clamp(0, 100) as u8;

    let mut flags = Vec::new();
    if dup >= 0.08 {
        flags.push(QualityFlag::DupSentences);
    }
    if rep3 >= 0.14 {
        flags.push(QualityFlag::RepeatedTrigrams);
    }
    if opening >= 0.22 {
        flags.push(QualityFlag::RepeatedIncipit);
    }
    if lazy.len() >= 2 {
        flags.push(QualityFlag::LazyPhrases);
    }
    if !has_promise {
        flags.push(QualityFlag::MissingPromise);
    }
    if !has_problem {
        flags.push(QualityFlag::MissingProblem);
    }
    if !micro_ok {
        flags.push(QualityFlag::MicroNarrationWeak);
    }

    QualityReport {
        score,
        flags,
        metrics: QualityMetrics {
            sentence_count: sentences.len(),
            token_count: tokens.len(),
            dup_sentence_ratio: round3(dup),
            repeated_trigram_ratio: round3(rep3),
            repeated_opening_ratio: round3(opening),
            lazy_phrase_hits: lazy.len(),
            lazy_phrase_matched: lazy,
            has_problem,
            has_promise,
            micro_narration_ok: micro_ok,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{hook_signals, score_script, QualityFlag};
    use crate::tables::RewriteTables;

    const HOOK: &str = "Se dopo cinque minuti hai fiato corto e gambe dure, in 30 giorni ritrovi \
                        respiro stabile, energia e un passo sicuro senza forzare.";

    #[test]
    fn scoring_is_idempotent() {
        let t = RewriteTables::builtin();
        let text = format!("{HOOK} Parti piano e osserva il respiro. Poi allunga il passo con calma.");
        let a = score_script(&text, t);
        let b = score_script(&text, t);
        assert_eq!(a, b);
    }

    #[test]
    fn detects_hook_problem_and_promise() {
        let t = RewriteTables::builtin();
        assert_eq!(hook_signals(HOOK, t), (true, true));
        assert_eq!(hook_signals("Oggi parliamo di scarpe comode.", t), (false, false));
    }

    #[test]
    fn penalizes_duplicates_and_lazy_phrases() {
        let t = RewriteTables::builtin();
        let body = "In questo video scopriamo insieme come camminare. \
                    Mantieni il passo corto e regolare. Mantieni il passo corto e regolare. \
                    Mantieni il passo corto e regolare.";
        let r = score_script(body, t);
        assert!(r.flags.contains(&QualityFlag::DupSentences));
        assert!(r.flags.contains(&QualityFlag::LazyPhrases));
        assert!(r.flags.contains(&QualityFlag::MissingPromise));
        assert_eq!(r.metrics.lazy_phrase_hits, 2);
        assert!(r.score < 60);
        assert!(r.render_block().contains("DUP_SENTENCES"));
    }
}
