use serde::Serialize;

use crate::document::Document;
use crate::ngram::{introduces_repeats, NgramParams};
use crate::sentences::segment;
use crate::tables::RewriteTables;
use crate::textutil::{clean_for_match, cleanup_sentence_spacing};
use crate::tokens::{tokenize, Token};
use crate::zone::ProtectedZone;

/// One open-loop cue found in the token stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CueMatch {
    pub phrase: String,
    pub first_word: usize,
    pub word_len: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CueGap {
    pub from_word: usize,
    pub to_word: usize,
    pub words: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CueParams {
    pub max_gap_words: usize,
    pub max_insertions: usize,
}

impl Default for CueParams {
    fn default() -> Self {
        Self {
            max_gap_words: 225,
            max_insertions: 2,
        }
    }
}

/// Exact token-sequence matches of `phrases`, in document order, one per start position
/// (the longest phrase wins).
#[must_use]
pub fn locate_cues(tokens: &[Token], phrases: &[String]) -> Vec<CueMatch> {
    let patterns: Vec<(String, Vec<String>)> = phrases
        .iter()
        .map(|p| {
            let words: Vec<String> = tokenize(p).into_iter().map(|t| t.normalized).collect();
            (p.clone(), words)
        })
        .filter(|(_, w)| !w.is_empty())
        .collect();

    let mut out: Vec<CueMatch> = Vec::new();
    for i in 0..tokens.len() {
        let best = patterns
            .iter()
            .filter(|(_, words)| {
                i + words.len() <= tokens.len()
                    && words
                        .iter()
                        .zip(&tokens[i..i + words.len()])
                        .all(|(w, t)| *w == t.normalized)
            })
            .max_by_key(|(_, words)| words.len());
        let Some((phrase, words)) = best else {
            continue;
        };
        if out.last().is_some_and(|prev| prev.first_word == i) {
            continue;
        }
        out.push(CueMatch {
            phrase: phrase.clone(),
            first_word: i,
            word_len: words.len(),
            start: tokens[i].start,
            end: tokens[i + words.len() - 1].end,
        });
    }
    out
}

#[must_use]
pub fn cue_gaps(cues: &[CueMatch]) -> Vec<CueGap> {
    cues.windows(2)
        .map(|w| CueGap {
            from_word: w[0].first_word,
            to_word: w[1].first_word,
            words: w[1].first_word - w[0].first_word,
        })
        .collect()
}

/// Widest gap strictly above `max_gap_words`; ties go to the earliest.
#[must_use]
pub fn worst_gap(gaps: &[CueGap], max_gap_words: usize) -> Option<CueGap> {
    gaps.iter()
        .filter(|g| g.words > max_gap_words)
        .fold(None, |best: Option<CueGap>, g| match best {
            Some(b) if b.words >= g.words => Some(b),
            _ => Some(*g),
        })
}

/// Inserts bridge paragraphs (teaser question + payoff) into over-wide cue gaps.
/// Returns the number of insertions made.
pub fn space_cues(
    doc: &mut Document,
    zone: &ProtectedZone,
    tables: &RewriteTables,
    params: &CueParams,
    ngram: NgramParams,
    seed: u64,
) -> usize {
    let questions = &tables.cues.questions;
    let payoffs = &tables.cues.payoffs;
    if questions.is_empty() || payoffs.is_empty() {
        return 0;
    }

    let mut inserted = 0usize;
    while inserted < params.max_insertions {
        let tokens = doc.tokens();
        let cues = locate_cues(&tokens, &tables.cues.phrases);
        if cues.len() < 2 {
            break;
        }
        let Some(gap) = worst_gap(&cue_gaps(&cues), params.max_gap_words) else {
            break;
        };
        let Some(window) = zone.window(doc.text(), &tokens) else {
            break;
        };
        let Some(at) = insertion_point(doc.text(), &tokens, gap, window.start, window.end) else {
            log::debug!("cue gap at word {} has no editable insertion point", gap.from_word);
            break;
        };

        let haystack = clean_for_match(doc.text());
        let total = questions.len() * payoffs.len();
        let base = (seed % total as u64) as usize;
        let mut committed = false;
        for k in 0..total {
            let qi = (base + inserted + k) % questions.len();
            let pi = (base * 3 + inserted + k) % payoffs.len();
            let (q, p) = (&questions[qi], &payoffs[pi]);
            if haystack.contains(&clean_for_match(q)) || haystack.contains(&clean_for_match(p)) {
                continue;
            }
            let mut candidate = doc.clone();
            candidate.insert_paragraph(at, &format!("{q} {p}"));
            let after = candidate.tokens();
            if introduces_repeats(&tokens, &after, ngram) {
                continue;
            }
            log::debug!("cue bridge inserted at byte {at}: {q}");
            *doc = candidate;
            committed = true;
            break;
        }
        if !committed {
            break;
        }
        inserted += 1;
    }
    inserted
}

/// A sentence end near the middle of `gap`, at least two words away from both cues and
/// inside the editable bytes.
fn insertion_point(
    text: &str,
    tokens: &[Token],
    gap: CueGap,
    window_start: usize,
    window_end: usize,
) -> Option<usize> {
    let mid = gap.from_word + gap.words / 2;
    let lo = gap.from_word + 2;
    let hi = gap.to_word.saturating_sub(2);
    segment(text, tokens)
        .into_iter()
        .filter(|s| {
            let last = s.tokens.end.saturating_sub(1);
            last >= lo && last < hi && s.end >= window_start && s.end <= window_end
        })
        .min_by_key(|s| (s.tokens.end.saturating_sub(1)).abs_diff(mid))
        .map(|s| s.end)
}

/// Drops sentences that start with one of the legacy fixed cue lines.
#[must_use]
pub fn strip_legacy_cues(block: &str, legacy: &[String]) -> String {
    if legacy.is_empty() {
        return block.to_string();
    }
    let keys: Vec<String> = legacy.iter().map(|l| clean_for_match(l)).collect();
    let tokens = tokenize(block);
    let mut out = String::with_capacity(block.len());
    let mut cursor = 0usize;
    for s in segment(block, &tokens) {
        let clean = clean_for_match(s.text(block));
        if keys.iter().any(|k| !k.is_empty() && clean.starts_with(k.as_str())) {
            out.push_str(&block[cursor..s.start]);
            cursor = s.end;
        }
    }
    out.push_str(&block[cursor..]);
    cleanup_sentence_spacing(&out)
}

#[cfg(test)]
mod tests {
    use super::{cue_gaps, locate_cues, space_cues, strip_legacy_cues, worst_gap, CueParams};
    use crate::document::Document;
    use crate::ngram::NgramParams;
    use crate::tables::RewriteTables;
    use crate::tokens::tokenize;
    use crate::zone::ProtectedZone;

    fn filler(prefix: &str, n: usize) -> String {
        (0..n)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .chunks(10)
            .map(|c| format!("{}.", c.join(" ")))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn finds_cues_and_measures_gaps() {
        let phrases = vec!["tra poco".to_string(), "tra un attimo".to_string(), "più avanti".to_string()];
        let toks = tokenize("Tra poco lo vedi. Poi, piu avanti, arriva altro. Tra un attimo chiudo.");
        let cues = locate_cues(&toks, &phrases);
        let starts: Vec<usize> = cues.iter().map(|c| c.first_word).collect();
        assert_eq!(starts, vec![0, 5, 9]);
        assert_eq!(cues[2].word_len, 3);
        let gaps = cue_gaps(&cues);
        assert_eq!(gaps[0].words, 5);
        assert_eq!(worst_gap(&gaps, 4).map(|g| g.from_word), Some(0));
        assert!(worst_gap(&gaps, 5).is_none());
    }

    #[test]
    fn bridges_split_wide_gaps_outside_protected_zone() {
        let text = format!(
            "Tra poco vediamo il punto. {} Alla fine trovi la sintesi.",
            filler("parola", 400)
        );
        let mut doc = Document::from_text(text.clone());
        let zone = ProtectedZone::new(20, 10);
        let tables = RewriteTables::builtin();
        let n = space_cues(
            &mut doc,
            &zone,
            tables,
            &CueParams::default(),
            NgramParams::default(),
            7,
        );
        assert!(n >= 1);
        let toks = doc.tokens();
        let cues = locate_cues(&toks, &tables.cues.phrases);
        assert!(cues.len() >= 2 + n);
        let src = tokenize(&text);
        let head_end = src[19].end;
        assert_eq!(&doc.text()[..head_end], &text[..head_end]);
        assert!(doc.text().ends_with("Alla fine trovi la sintesi."));
    }

    #[test]
    fn large_seeds_rotate_like_their_residue() {
        let text = format!(
            "Tra poco vediamo il punto. {} Alla fine trovi la sintesi.",
            filler("parola", 400)
        );
        let tables = RewriteTables::builtin();
        let total = (tables.cues.questions.len() * tables.cues.payoffs.len()) as u64;
        let run = |seed: u64| {
            let mut doc = Document::from_text(text.clone());
            space_cues(
                &mut doc,
                &ProtectedZone::new(20, 10),
                tables,
                &CueParams::default(),
                NgramParams::default(),
                seed,
            );
            doc.into_text()
        };
        assert_eq!(run(u64::MAX), run(u64::MAX % total));
        assert_eq!(run(total + 5), run(5));
    }

    #[test]
    fn strips_legacy_cue_sentences() {
        let legacy = vec!["Ecco l'errore".to_string()];
        let out = strip_legacy_cues("Primo punto. Ecco l'errore che fai. Ultimo punto.", &legacy);
        assert_eq!(out, "Primo punto. Ultimo punto.");
    }
}
