//! Repetition and duplication repair.
//!
//! Every edit is proposed as a [`RewriteCandidate`] against a fresh token view, applied to a
//! scratch copy of the document and committed only when the targeted count strictly drops
//! and no new repeated n-gram appears. Derived views are rebuilt after every commit.

mod duplicate;
mod hotspot;
mod lexical;
mod sentence;

use std::collections::BTreeSet;
use std::ops::Range;

use serde::Serialize;

use crate::document::Document;
use crate::ngram::{count_of, repeated_records, NgramParams, NgramTally};
use crate::sentences::segment;
use crate::tables::RewriteTables;
use crate::tokens::Token;
use crate::zone::{EditableWindow, ProtectedZone};

pub use duplicate::{dedupe_sentences, rewrite_duplicate};
pub use hotspot::{cap_hotspots, remove_banned_sentences, script_hotspots};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Phrase,
    Lexical,
    Sentence,
    Duplicate,
    Hotspot,
}

/// A committed edit. `target` is the byte range replaced in the text as it was before the
/// edit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteCandidate {
    pub target: Range<usize>,
    pub replacement: String,
    pub strategy: Strategy,
    pub pre_edit_count: usize,
    pub post_edit_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepetitionParams {
    pub ngram: NgramParams,
    pub max_passes: usize,
    pub max_fixes: usize,
}

impl Default for RepetitionParams {
    fn default() -> Self {
        Self {
            ngram: NgramParams::default(),
            max_passes: 4,
            max_fixes: 12,
        }
    }
}

/// An unvalidated proposal.
#[derive(Clone, Debug)]
pub(crate) struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
    pub strategy: Strategy,
}

/// Applies `edit` to a copy of `doc` and returns it with the candidate record when the
/// count measured by `measure` strictly drops and no new repeated n-gram appears.
/// `tally` holds the n-gram counts of `before`, the tokens of `doc`.
pub(crate) fn validate<F>(
    doc: &Document,
    before: &[Token],
    tally: &NgramTally,
    window: &EditableWindow,
    edit: &Edit,
    pre: usize,
    measure: F,
) -> Option<(Document, RewriteCandidate)>
where
    F: Fn(&Document, &[Token]) -> usize,
{
    if !window.allows_bytes(edit.range.start, edit.range.end) {
        return None;
    }
    if doc.text()[edit.range.clone()] == edit.replacement {
        return None;
    }
    let mut next = doc.clone();
    next.splice(edit.range.clone(), &edit.replacement);
    let after = next.tokens();
    let post = measure(&next, &after);
    let inserted = edit.range.start..edit.range.start + edit.replacement.len();
    if post >= pre || tally.lifts_splice(before, edit.range.clone(), &after, inserted) {
        return None;
    }
    let cand = RewriteCandidate {
        target: edit.range.clone(),
        replacement: edit.replacement.clone(),
        strategy: edit.strategy,
        pre_edit_count: pre,
        post_edit_count: post,
    };
    Some((next, cand))
}

/// Middle occurrence first, then the rest in document order.
fn middle_first(positions: &[usize]) -> Vec<usize> {
    if positions.is_empty() {
        return Vec::new();
    }
    let mid = positions.len() / 2;
    let mut out = Vec::with_capacity(positions.len());
    out.push(positions[mid]);
    out.extend(
        positions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != mid)
            .map(|(_, p)| *p),
    );
    out
}

/// Lowers every n-gram at or above the threshold with phrase, lexical and sentence-level
/// strategies, in that priority. Bounded by `max_passes` x `max_fixes`.
///
/// An n-gram none of whose candidates validated is skipped for the rest of the pass.
pub fn reduce_repetition(
    doc: &mut Document,
    zone: &ProtectedZone,
    tables: &RewriteTables,
    params: &RepetitionParams,
) -> Vec<RewriteCandidate> {
    let n = params.ngram.size;
    let mut committed: Vec<RewriteCandidate> = Vec::new();

    for pass in 0..params.max_passes {
        let mut fixes = 0usize;
        let mut stuck: BTreeSet<String> = BTreeSet::new();
        while fixes < params.max_fixes {
            let tokens = doc.tokens();
            let Some(window) = zone.window(doc.text(), &tokens) else {
                return committed;
            };
            let records = repeated_records(&tokens, n, params.ngram.threshold);
            if records.is_empty() {
                return committed;
            }
            let tally = NgramTally::new(&tokens, params.ngram);
            let sentences = segment(doc.text(), &tokens);

            let rotation = pass + committed.len();
            let mut found: Option<(Document, RewriteCandidate)> = None;
            'records: for rec in records.iter() {
                if stuck.contains(&rec.key) {
                    continue;
                }
                let pre = rec.count();
                for pos in middle_first(&rec.positions) {
                    if !window.allows_words(pos, pos + n - 1) {
                        continue;
                    }
                    let mut edits = lexical::phrase_edits(tables, &tokens, pos, n, &rec.key, rotation);
                    edits.extend(lexical::lexical_edits(tables, &tokens, pos, n, rotation));
                    edits.extend(sentence::sentence_edits(
                        doc.text(),
                        &sentences,
                        pos,
                        tables,
                        rotation,
                        &window,
                    ));
                    for edit in &edits {
                        let measured = validate(doc, &tokens, &tally, &window, edit, pre, |_, t| {
                            count_of(t, &rec.key, n)
                        });
                        if measured.is_some() {
                            found = measured;
                            break 'records;
                        }
                    }
                }
                stuck.insert(rec.key.clone());
            }

            let Some((next, cand)) = found else {
                break;
            };
            log::debug!(
                "rewrite[{:?}] {}..{} -> {:?} ({} -> {})",
                cand.strategy,
                cand.target.start,
                cand.target.end,
                cand.replacement,
                cand.pre_edit_count,
                cand.post_edit_count
            );
            *doc = next;
            committed.push(cand);
            fixes += 1;
        }
        if fixes == 0 {
            break;
        }
    }
    committed
}

#[cfg(test)]
mod tests {
    use super::{middle_first, reduce_repetition, RepetitionParams, Strategy};
    use crate::document::Document;
    use crate::ngram::count_of;
    use crate::tables::RewriteTables;
    use crate::tokens::tokenize;
    use crate::zone::ProtectedZone;

    #[test]
    fn orders_middle_occurrence_first() {
        assert_eq!(middle_first(&[0, 3, 6]), vec![3, 0, 6]);
        assert_eq!(middle_first(&[2, 9]), vec![9, 2]);
        assert!(middle_first(&[]).is_empty());
    }

    #[test]
    fn curated_phrase_drops_below_threshold() {
        let text = "cammina ogni giorno cammina ogni giorno cammina ogni giorno";
        let mut doc = Document::from_text(text);
        let log = reduce_repetition(
            &mut doc,
            &ProtectedZone::none(),
            RewriteTables::builtin(),
            &RepetitionParams::default(),
        );
        assert!(!log.is_empty());
        assert_eq!(log[0].strategy, Strategy::Phrase);
        assert!(log.iter().all(|c| c.post_edit_count < c.pre_edit_count));
        assert!(count_of(&doc.tokens(), "cammina ogni giorno", 3) < 3);
    }

    #[test]
    fn falls_back_to_synonyms() {
        let text = "Il ritmo costante aiuta. Il ritmo costante calma. Il ritmo costante regge.";
        let mut doc = Document::from_text(text);
        let log = reduce_repetition(
            &mut doc,
            &ProtectedZone::none(),
            RewriteTables::builtin(),
            &RepetitionParams::default(),
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].strategy, Strategy::Lexical);
        assert!(doc.text().contains("cadenza"));
        assert_eq!(count_of(&tokenize(doc.text()), "il ritmo costante", 3), 2);
    }

    #[test]
    fn leaves_protected_occurrences_alone() {
        let text = "cammina ogni giorno cammina ogni giorno cammina ogni giorno";
        let mut doc = Document::from_text(text);
        let log = reduce_repetition(
            &mut doc,
            &ProtectedZone::new(5, 5),
            RewriteTables::builtin(),
            &RepetitionParams::default(),
        );
        assert!(log.is_empty());
        assert_eq!(doc.text(), text);
    }
}
