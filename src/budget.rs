//! Word-count budget: pads short scripts with topic-anchored paragraphs and trims long
//! ones sentence by sentence, evening out the block lengths.

use std::collections::BTreeSet;
use std::ops::Range;

use serde::Serialize;

use crate::document::{Document, SegmentKind};
use crate::ngram::{NgramParams, NgramTally};
use crate::sentences::{segment, signature, Sentence};
use crate::tables::{rotate, RewriteTables};
use crate::textutil::{clean_for_match, fill_slots};
use crate::tokens::{tokenize, tokens_within, Token};
use crate::zone::{EditableWindow, ProtectedZone};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetState {
    Pad,
    Trim,
    Stable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LengthBudget {
    pub min_words: usize,
    pub max_words: usize,
    pub target_words: usize,
}

impl LengthBudget {
    /// `round(minutes * wpm * factor)` for both bounds.
    #[must_use]
    pub fn from_minutes(minutes: u32, words_per_minute: u32, min_factor: f64, max_factor: f64) -> Self {
        let base = f64::from(minutes) * f64::from(words_per_minute);
        Self {
            min_words: (base * min_factor).round() as usize,
            max_words: (base * max_factor).round() as usize,
            target_words: base.round() as usize,
        }
    }

    #[must_use]
    pub fn state(&self, words: usize) -> BudgetState {
        if words < self.min_words {
            BudgetState::Pad
        } else if words > self.max_words {
            BudgetState::Trim
        } else {
            BudgetState::Stable
        }
    }

    #[must_use]
    pub fn contains(&self, words: usize) -> bool {
        self.state(words) == BudgetState::Stable
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BudgetParams {
    pub pad_attempts: usize,
    pub ngram: NgramParams,
}

impl Default for BudgetParams {
    fn default() -> Self {
        Self {
            pad_attempts: 260,
            ngram: NgramParams::default(),
        }
    }
}

/// Inputs of the pad paragraph builder.
#[derive(Clone, Copy, Debug)]
pub struct PadSource<'a> {
    pub tables: &'a RewriteTables,
    pub anchors: &'a [String],
    pub audience: &'a str,
    pub script_type: &'a str,
}

/// Rotation cursor and used paragraph signatures; lives for one run.
#[derive(Clone, Debug, Default)]
pub struct PadState {
    pub next: usize,
    pub used: BTreeSet<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetOutcome {
    pub pads_added: usize,
    pub words_trimmed: usize,
    pub attempts: usize,
    pub exhausted: bool,
}

/// Paragraph number `k` of the pad rotation: opener (with anchor), action, check, voice,
/// type frame and context line, each pool indexed by `k`.
#[must_use]
pub fn build_pad_paragraph(src: &PadSource<'_>, k: usize) -> Option<String> {
    let pad = &src.tables.pad;
    let anchor = rotate(src.anchors, k)
        .map(String::as_str)
        .or_else(|| src.tables.anchors.fallback.first().map(String::as_str))
        .unwrap_or("ritmo");
    let opener = fill_slots(rotate(&pad.openers, k)?, &[("anchor", anchor)]);
    let parts = [
        opener,
        rotate(&pad.actions, k)?.clone(),
        rotate(&pad.checks, k)?.clone(),
        rotate(src.tables.pad_voices(src.audience), k)?.clone(),
        rotate(src.tables.pad_frames(src.script_type), k)?.clone(),
        rotate(&pad.contexts, k)?.clone(),
    ];
    Some(parts.join(" "))
}

/// Tokens, sentences and editable window of the current text.
struct View {
    tokens: Vec<Token>,
    sentences: Vec<Sentence>,
    window: EditableWindow,
}

impl View {
    fn of(doc: &Document, zone: &ProtectedZone) -> Option<Self> {
        let tokens = doc.tokens();
        let window = zone.window(doc.text(), &tokens)?;
        let sentences = segment(doc.text(), &tokens);
        Some(Self {
            tokens,
            sentences,
            window,
        })
    }
}

/// `(word count, insertion byte)` for every block with a sentence ending inside the
/// editable window; the byte is the end of the last such sentence.
fn block_slots(doc: &Document, view: &View) -> Vec<(usize, usize)> {
    doc.segments()
        .into_iter()
        .filter(|(kind, _)| matches!(kind, SegmentKind::Block(_)))
        .filter_map(|(_, range)| {
            let at = view
                .sentences
                .iter()
                .rev()
                .filter(|s| s.start >= range.start && s.end <= range.end)
                .find(|s| s.end >= view.window.start && s.end <= view.window.end)?
                .end;
            Some((tokens_within(&view.tokens, range).len(), at))
        })
        .collect()
}

/// Where a pad paragraph goes: after the last editable sentence of the shortest block, else
/// the last paragraph break of the editable zone, else the end of a text with no protected
/// tail.
fn pad_insertion_point(doc: &Document, view: &View) -> Option<usize> {
    if let Some((_, at)) = block_slots(doc, view)
        .into_iter()
        .min_by_key(|(words, _)| *words)
    {
        return Some(at);
    }
    let text = doc.text();
    let window = &view.window;
    let region = &text[window.start..window.end];
    if let Some(p) = region.rfind("\n\n") {
        let at = text[..window.start + p].trim_end().len();
        return Some(at.max(window.start));
    }
    (window.end == text.len()).then_some(text.len())
}

enum PadAttempt {
    Added,
    Skipped,
    Exhausted,
}

/// Pad candidates with their filters: skip phrases, reuse, overshoot, sentences already
/// in the text and new repeated n-grams.
struct Padder<'s, 'a> {
    src: &'s PadSource<'a>,
    skips: Vec<String>,
    ngram: NgramParams,
}

impl<'s, 'a> Padder<'s, 'a> {
    fn new(src: &'s PadSource<'a>, ngram: NgramParams) -> Self {
        let skips = src
            .tables
            .pad
            .skip_phrases
            .iter()
            .map(|s| clean_for_match(s))
            .filter(|s| !s.is_empty())
            .collect();
        Self { src, skips, ngram }
    }

    /// Tries the next pad paragraph of the rotation at byte `at`.
    fn try_at(
        &self,
        doc: &mut Document,
        view: &View,
        at: usize,
        max_words: usize,
        state: &mut PadState,
    ) -> PadAttempt {
        let k = state.next;
        state.next += 1;
        let Some(pad) = build_pad_paragraph(self.src, k) else {
            return PadAttempt::Exhausted;
        };
        let sig = signature(&pad);
        let clean = clean_for_match(&pad);
        if state.used.contains(&sig) || self.skips.iter().any(|s| clean.contains(s.as_str())) {
            return PadAttempt::Skipped;
        }
        let pad_tokens = tokenize(&pad);
        if view.tokens.len() + pad_tokens.len() > max_words {
            return PadAttempt::Skipped;
        }
        let present: BTreeSet<&str> = view.sentences.iter().map(|s| s.signature.as_str()).collect();
        if segment(&pad, &pad_tokens)
            .iter()
            .any(|s| present.contains(s.signature.as_str()))
        {
            return PadAttempt::Skipped;
        }
        let mut next = doc.clone();
        let body = next.insert_paragraph(at, &pad);
        let tally = NgramTally::new(&view.tokens, self.ngram);
        if tally.lifts_splice(&view.tokens, at..at, &next.tokens(), at..body.end) {
            return PadAttempt::Skipped;
        }
        log::debug!("pad paragraph {k} added ({} words)", pad_tokens.len());
        state.used.insert(sig);
        *doc = next;
        PadAttempt::Added
    }
}

/// Adds pad paragraphs, each after the last editable sentence of the shortest block, until
/// `min_words` is reached or the attempt budget runs out. Candidates already used,
/// containing a skip phrase, overshooting `max_words`, repeating a sentence of the text or
/// creating a new repeated n-gram are discarded.
pub fn pad_to_min(
    doc: &mut Document,
    zone: &ProtectedZone,
    budget: &LengthBudget,
    src: &PadSource<'_>,
    state: &mut PadState,
    params: &BudgetParams,
) -> BudgetOutcome {
    let mut out = BudgetOutcome::default();
    let padder = Padder::new(src, params.ngram);
    while out.attempts < params.pad_attempts {
        let Some(view) = View::of(doc, zone) else {
            break;
        };
        if view.tokens.len() >= budget.min_words {
            return out;
        }
        let Some(at) = pad_insertion_point(doc, &view) else {
            break;
        };
        out.attempts += 1;
        match padder.try_at(doc, &view, at, budget.max_words, state) {
            PadAttempt::Added => out.pads_added += 1,
            PadAttempt::Skipped => {}
            PadAttempt::Exhausted => break,
        }
    }
    out.exhausted = doc.word_count() < budget.min_words;
    if out.exhausted {
        log::warn!(
            "pad budget exhausted after {} attempts at {} words (min {})",
            out.attempts,
            doc.word_count(),
            budget.min_words
        );
    }
    out
}

/// Pads blocks still under `block_min` words, shortest first, while the total stays within
/// `max_words`. Blocks with no sentence end in the editable window are left alone.
pub fn pad_blocks_to_min(
    doc: &mut Document,
    zone: &ProtectedZone,
    budget: &LengthBudget,
    block_min: usize,
    src: &PadSource<'_>,
    state: &mut PadState,
    params: &BudgetParams,
) -> BudgetOutcome {
    let mut out = BudgetOutcome::default();
    let padder = Padder::new(src, params.ngram);
    while out.attempts < params.pad_attempts {
        let Some(view) = View::of(doc, zone) else {
            break;
        };
        let Some((_, at)) = block_slots(doc, &view)
            .into_iter()
            .filter(|(words, _)| *words < block_min)
            .min_by_key(|(words, _)| *words)
        else {
            break;
        };
        out.attempts += 1;
        match padder.try_at(doc, &view, at, budget.max_words, state) {
            PadAttempt::Added => out.pads_added += 1,
            PadAttempt::Skipped => {}
            PadAttempt::Exhausted => break,
        }
    }
    out.exhausted = doc.block_word_counts().iter().any(|&n| n < block_min);
    if out.pads_added > 0 {
        log::debug!("block top-up added {} pad paragraphs", out.pads_added);
    }
    out
}

/// Bytes removed along with sentence `s`: the sentence and the spaces after it, or at the
/// end of a paragraph the spaces before it. A sentence alone in its paragraph takes the
/// following break with it.
fn sentence_cut(text: &str, s: &Sentence) -> Range<usize> {
    let rest = &text[s.end..];
    let trailing = rest.len() - rest.trim_start().len();
    if trailing == rest.len() {
        return text[..s.start].trim_end().len()..text.len();
    }
    if !rest[..trailing].contains('\n') {
        return s.start..s.end + trailing;
    }
    let lead = text[..s.start].trim_end_matches([' ', '\t']).len();
    if lead == 0 || text[..lead].ends_with('\n') {
        s.start..s.end + trailing
    } else {
        lead..s.end
    }
}

/// Index of the next sentence to trim: the middle editable sentence of the longest block
/// that still has one. Ties go to the earlier block.
fn trim_target(doc: &Document, view: &View) -> Option<usize> {
    let editable: Vec<usize> = (0..view.sentences.len())
        .filter(|&i| {
            let s = &view.sentences[i];
            view.window.allows_bytes(s.start, s.end)
        })
        .collect();
    let blocks: Vec<(usize, Vec<usize>)> = doc
        .segments()
        .into_iter()
        .filter(|(kind, _)| matches!(kind, SegmentKind::Block(_)))
        .map(|(_, range)| {
            let own = editable
                .iter()
                .copied()
                .filter(|&i| {
                    let s = &view.sentences[i];
                    s.start >= range.start && s.end <= range.end
                })
                .collect();
            (tokens_within(&view.tokens, range).len(), own)
        })
        .collect();
    let mut best: Option<(usize, &[usize])> = None;
    for (words, own) in &blocks {
        if own.is_empty() {
            continue;
        }
        if best.map_or(true, |(w, _)| *words > w) {
            best = Some((*words, own.as_slice()));
        }
    }
    best.map(|(_, own)| own[own.len() / 2])
}

/// Removes whole editable sentences until the text fits `max_words`. Every cut takes the
/// middle editable sentence of the currently longest block, so the excess is spread over
/// the blocks.
pub fn trim_to_max(doc: &mut Document, zone: &ProtectedZone, budget: &LengthBudget) -> BudgetOutcome {
    let mut out = BudgetOutcome::default();
    let start_words = doc.word_count();
    if start_words <= budget.max_words {
        return out;
    }
    while let Some(view) = View::of(doc, zone) {
        if view.tokens.len() <= budget.max_words {
            break;
        }
        let Some(target) = trim_target(doc, &view) else {
            break;
        };
        let cut = sentence_cut(doc.text(), &view.sentences[target]);
        doc.splice(cut, "");
    }
    let words = doc.word_count();
    out.words_trimmed = start_words.saturating_sub(words);
    out.exhausted = words > budget.max_words;
    log::debug!("trimmed {} words from the editable zone", out.words_trimmed);
    out
}

/// One controller step: pad, trim or leave the text alone according to its state.
pub fn enforce_range(
    doc: &mut Document,
    zone: &ProtectedZone,
    budget: &LengthBudget,
    src: &PadSource<'_>,
    state: &mut PadState,
    params: &BudgetParams,
) -> (BudgetState, BudgetOutcome) {
    let before = budget.state(doc.word_count());
    let outcome = match before {
        BudgetState::Pad => pad_to_min(doc, zone, budget, src, state, params),
        BudgetState::Trim => trim_to_max(doc, zone, budget),
        BudgetState::Stable => BudgetOutcome::default(),
    };
    (before, outcome)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        build_pad_paragraph, enforce_range, pad_blocks_to_min, pad_to_min, sentence_cut,
        trim_to_max, BudgetParams, BudgetState, LengthBudget, PadSource, PadState,
    };
    use crate::document::Document;
    use crate::sentences::segment;
    use crate::tables::RewriteTables;
    use crate::tokens::tokenize;
    use crate::zone::ProtectedZone;

    fn three_blocks(sizes: [usize; 3]) -> Document {
        let blocks = vec![
            sentences("alfa", sizes[0]),
            sentences("beta", sizes[1]),
            sentences("gamma", sizes[2]),
        ];
        Document::assemble("Apertura breve qui.", &blocks, "Chiusura breve qui.")
    }

    fn pad_source(anchors: &[String]) -> PadSource<'_> {
        PadSource {
            tables: RewriteTables::builtin(),
            anchors,
            audience: "over60",
            script_type: "howto",
        }
    }

    fn sentences(prefix: &str, words: usize) -> String {
        (0..words)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .chunks(12)
            .map(|c| format!("{}.", c.join(" ")))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn bounds_follow_minutes() {
        let b = LengthBudget::from_minutes(9, 150, 0.85, 1.15);
        assert_eq!((b.min_words, b.max_words, b.target_words), (1148, 1552, 1350));
        assert_eq!(b.state(1000), BudgetState::Pad);
        assert_eq!(b.state(1600), BudgetState::Trim);
        assert!(b.contains(1350));
    }

    #[test]
    fn pad_paragraphs_rotate_every_pool() {
        let anchors = vec!["ritmo".to_string(), "respiro".to_string()];
        let src = PadSource {
            tables: RewriteTables::builtin(),
            anchors: &anchors,
            audience: "over60",
            script_type: "howto",
        };
        let a = build_pad_paragraph(&src, 0).expect("pad");
        let b = build_pad_paragraph(&src, 1).expect("pad");
        assert!(a.starts_with("Sul punto ritmo,"));
        assert!(b.starts_with("Nel tratto dedicato a respiro,"));
        assert_ne!(a, b);
    }

    #[test]
    fn pads_into_range_without_touching_tail() {
        let text = format!("{}\n\nChiusura protetta del testo qui.", sentences("voce", 600));
        let mut doc = Document::from_text(text.clone());
        let zone = ProtectedZone::new(30, 5);
        let budget = LengthBudget {
            min_words: 900,
            max_words: 1100,
            target_words: 1000,
        };
        let anchors = vec!["ritmo".to_string(), "respiro".to_string()];
        let src = PadSource {
            tables: RewriteTables::builtin(),
            anchors: &anchors,
            audience: "over60",
            script_type: "howto",
        };
        let mut state = PadState::default();
        let (before, outcome) =
            enforce_range(&mut doc, &zone, &budget, &src, &mut state, &BudgetParams::default());
        assert_eq!(before, BudgetState::Pad);
        assert!(outcome.pads_added > 0);
        assert!(!outcome.exhausted);
        let words = doc.word_count();
        assert!((900..=1100).contains(&words), "words = {words}");
        assert!(doc.text().ends_with("\n\nChiusura protetta del testo qui."));
        let head = &text[..tokenize(&text)[29].end];
        assert!(doc.text().starts_with(head));
    }

    #[test]
    fn trims_whole_sentences_from_the_middle() {
        let text = sentences("parola", 1300);
        let mut doc = Document::from_text(text.clone());
        let zone = ProtectedZone::new(100, 100);
        let budget = LengthBudget {
            min_words: 900,
            max_words: 1100,
            target_words: 1000,
        };
        let outcome = trim_to_max(&mut doc, &zone, &budget);
        let words = doc.word_count();
        assert!(words <= 1100 && words >= 900, "words = {words}");
        assert_eq!(outcome.words_trimmed, 1300 - words);
        let toks = tokenize(&text);
        assert!(doc.text().starts_with(&text[..toks[99].end]));
        assert!(doc.text().ends_with(&text[toks[1200].start..]));
    }

    #[test]
    fn trim_evens_out_the_longest_blocks() {
        let mut doc = three_blocks([96, 120, 108]);
        assert_eq!(doc.word_count(), 330);
        let budget = LengthBudget {
            min_words: 200,
            max_words: 282,
            target_words: 250,
        };
        let outcome = trim_to_max(&mut doc, &ProtectedZone::none(), &budget);
        assert_eq!(doc.block_word_counts(), vec![84, 96, 96]);
        assert_eq!(outcome.words_trimmed, 48);
        assert!(!outcome.exhausted);
        assert!(doc.text().starts_with("Apertura breve qui.\n\nalfa0 "));
        assert!(doc.text().ends_with("\n\nChiusura breve qui."));
    }

    #[test]
    fn cuts_keep_paragraph_breaks_tidy() {
        let cut = |text: &str, nth: usize| {
            let s = &segment(text, &tokenize(text))[nth];
            let mut out = text.to_string();
            out.replace_range(sentence_cut(text, s), "");
            out
        };
        assert_eq!(cut("Uno due. Tre quattro. Cinque sei.", 1), "Uno due. Cinque sei.");
        assert_eq!(cut("Uno due. Tre quattro.\n\nCinque sei.", 1), "Uno due.\n\nCinque sei.");
        assert_eq!(
            cut("Uno due.\n\nTre quattro.\n\nCinque sei.", 1),
            "Uno due.\n\nCinque sei."
        );
        assert_eq!(cut("Uno due.\n\nTre quattro.", 1), "Uno due.");
    }

    #[test]
    fn pads_go_to_the_shortest_block() {
        let mut doc = three_blocks([96, 36, 60]);
        let before = doc.word_count();
        let budget = LengthBudget {
            min_words: before + 10,
            max_words: before + 400,
            target_words: before + 100,
        };
        let anchors = vec!["ritmo".to_string()];
        let mut state = PadState::default();
        let outcome = pad_to_min(
            &mut doc,
            &ProtectedZone::none(),
            &budget,
            &pad_source(&anchors),
            &mut state,
            &BudgetParams::default(),
        );
        assert_eq!(outcome.pads_added, 1);
        let counts = doc.block_word_counts();
        assert_eq!((counts[0], counts[2]), (96, 60));
        assert!(counts[1] > 36);
    }

    #[test]
    fn top_up_fills_blocks_under_the_minimum() {
        let anchors = vec!["ritmo".to_string()];
        let mut doc = three_blocks([96, 36, 60]);
        let roomy = LengthBudget {
            min_words: 100,
            max_words: 1000,
            target_words: 500,
        };
        let mut state = PadState::default();
        let outcome = pad_blocks_to_min(
            &mut doc,
            &ProtectedZone::none(),
            &roomy,
            50,
            &pad_source(&anchors),
            &mut state,
            &BudgetParams::default(),
        );
        assert!(!outcome.exhausted);
        let counts = doc.block_word_counts();
        assert_eq!((counts[0], counts[2]), (96, 60));
        assert!(counts[1] >= 50);

        let mut tight = three_blocks([96, 36, 60]);
        let text = tight.text().to_string();
        let budget = LengthBudget {
            max_words: tight.word_count() + 5,
            ..roomy
        };
        let outcome = pad_blocks_to_min(
            &mut tight,
            &ProtectedZone::none(),
            &budget,
            50,
            &pad_source(&anchors),
            &mut PadState::default(),
            &BudgetParams::default(),
        );
        assert!(outcome.exhausted);
        assert_eq!(tight.text(), text);
    }
}
