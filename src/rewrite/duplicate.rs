use std::collections::BTreeSet;

use super::{validate, Edit, RewriteCandidate, Strategy};
use crate::document::Document;
use crate::ngram::{NgramParams, NgramTally};
use crate::sentences::{find_duplicates, segment, signature, DuplicateParams};
use crate::tables::{rotate, RewriteTables};
use crate::textutil::{ensure_terminal_punct, lowercase_first, preserve_case};
use crate::tokens::tokenize;
use crate::zone::ProtectedZone;

/// Deterministic rewrite of a duplicate sentence for a given variant index.
///
/// Interrogative openers are replaced by a rotating question. Otherwise the sentence
/// gets a lead-phrase substitution when one applies, a single lexical swap, and a
/// connective prefix.
#[must_use]
pub fn rewrite_duplicate(sentence: &str, variant: usize, tables: &RewriteTables) -> String {
    let dt = &tables.duplicates;
    let trimmed = sentence.trim();
    if let Some(re) = dt.question_opener.as_ref() {
        if re.is_match(trimmed) {
            if let Some(q) = rotate(&dt.questions, variant) {
                return q.clone();
            }
        }
    }

    let mut body = trimmed.trim_end_matches(['.', '!', '?', '…']).to_string();
    let terminal = &trimmed[body.len()..];

    if let Some(lead) = dt.leads.iter().find(|l| l.pattern.is_match(&body)) {
        if let (Some(m), Some(opt)) = (lead.pattern.find(&body), rotate(&lead.options, variant)) {
            let replaced = preserve_case(m.as_str(), opt);
            body = format!("{}{}{}", &body[..m.start()], replaced, &body[m.end()..]);
        }
    }

    let swap = tokenize(&body).into_iter().find_map(|t| {
        dt.swaps
            .iter()
            .find(|s| s.word == t.normalized)
            .and_then(|s| rotate(&s.options, variant))
            .map(|opt| (t, opt))
    });
    if let Some((tok, opt)) = swap {
        let replaced = preserve_case(&tok.surface, opt);
        body = format!("{}{}{}", &body[..tok.start], replaced, &body[tok.end..]);
    }

    if let Some(prefix) = rotate(&dt.prefixes, variant) {
        body = format!("{prefix}{}", lowercase_first(&body));
    }
    let terminal = if terminal.is_empty() { "." } else { terminal };
    ensure_terminal_punct(&format!("{body}{terminal}"))
}

/// Rewrites flagged duplicate sentences one at a time, rescanning after every commit.
/// `variant` is the run-wide counter, advanced once per duplicate handled.
pub fn dedupe_sentences(
    doc: &mut Document,
    zone: &ProtectedZone,
    tables: &RewriteTables,
    params: &DuplicateParams,
    ngram: NgramParams,
    max_fixes: usize,
    variant: &mut usize,
) -> Vec<RewriteCandidate> {
    let mut committed = Vec::new();
    while committed.len() < max_fixes {
        let tokens = doc.tokens();
        let Some(window) = zone.window(doc.text(), &tokens) else {
            break;
        };
        let sentences = segment(doc.text(), &tokens);
        let dups = find_duplicates(&sentences, params, Some(&window));
        if dups.is_empty() {
            break;
        }
        let existing: BTreeSet<&str> = sentences.iter().map(|s| s.signature.as_str()).collect();
        let tally = NgramTally::new(&tokens, ngram);
        let pre = dups.len();
        let budget = tables.duplicates.prefixes.len().max(tables.duplicates.questions.len()).max(1) * 2;

        let mut found = None;
        'dups: for dup in &dups {
            let target = &sentences[dup.sentence];
            let original = target.text(doc.text());
            let base = *variant;
            *variant += 1;
            for k in 0..budget {
                let replacement = rewrite_duplicate(original, base + k, tables);
                let sig = signature(&replacement);
                if sig.is_empty() || existing.contains(sig.as_str()) {
                    continue;
                }
                let edit = Edit {
                    range: target.bytes(),
                    replacement,
                    strategy: Strategy::Duplicate,
                };
                let measured = validate(doc, &tokens, &tally, &window, &edit, pre, |d, t| {
                    let w = zone.window(d.text(), t);
                    find_duplicates(&segment(d.text(), t), params, w.as_ref()).len()
                });
                if measured.is_some() {
                    found = measured;
                    break 'dups;
                }
            }
        }

        let Some((next, cand)) = found else {
            break;
        };
        log::debug!("duplicate sentence rewritten: {:?}", cand.replacement);
        *doc = next;
        committed.push(cand);
    }
    committed
}
