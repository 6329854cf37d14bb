use super::{Edit, Strategy};
use crate::tables::RewriteTables;
use crate::textutil::preserve_case;
use crate::tokens::{phrase_words, Token};

/// Whole-n-gram substitutions from the curated phrase map, then fragment rotations for
/// shorter phrases embedded in the n-gram. Variants start at `rotation`.
pub(super) fn phrase_edits(
    tables: &RewriteTables,
    tokens: &[Token],
    pos: usize,
    n: usize,
    key: &str,
    rotation: usize,
) -> Vec<Edit> {
    let mut out = Vec::new();
    if let Some(variants) = tables.phrase_variants(key) {
        let range = tokens[pos].start..tokens[pos + n - 1].end;
        for k in 0..variants.len() {
            let v = &variants[(rotation + k) % variants.len()];
            out.push(Edit {
                range: range.clone(),
                replacement: preserve_case(&tokens[pos].surface, v),
                strategy: Strategy::Phrase,
            });
        }
    }

    let window = &tokens[pos..pos + n];
    for frag in &tables.fragments {
        let words = phrase_words(&frag.fragment);
        if words.is_empty() || words.len() >= n || frag.variants.is_empty() {
            continue;
        }
        for off in 0..=n - words.len() {
            let hit = words
                .iter()
                .zip(&window[off..off + words.len()])
                .all(|(w, t)| *w == t.normalized);
            if !hit {
                continue;
            }
            let first = &tokens[pos + off];
            let range = first.start..tokens[pos + off + words.len() - 1].end;
            for k in 0..frag.variants.len() {
                let v = &frag.variants[(rotation + k) % frag.variants.len()];
                out.push(Edit {
                    range: range.clone(),
                    replacement: preserve_case(&first.surface, v),
                    strategy: Strategy::Phrase,
                });
            }
        }
    }
    out
}

/// One synonym swap per n-gram word, visiting the middle word first.
pub(super) fn lexical_edits(
    tables: &RewriteTables,
    tokens: &[Token],
    pos: usize,
    n: usize,
    rotation: usize,
) -> Vec<Edit> {
    let order = [1usize, 2, 0];
    let mut out = Vec::new();
    for off in order.into_iter().chain(3..n) {
        if off >= n {
            continue;
        }
        let tok = &tokens[pos + off];
        let Some(syns) = tables.synonyms.get(&tok.normalized) else {
            continue;
        };
        if syns.is_empty() {
            continue;
        }
        let syn = &syns[(rotation + off) % syns.len()];
        out.push(Edit {
            range: tok.start..tok.end,
            replacement: preserve_case(&tok.surface, syn),
            strategy: Strategy::Lexical,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{lexical_edits, phrase_edits};
    use crate::tables::RewriteTables;
    use crate::tokens::tokenize;

    #[test]
    fn phrase_variants_rotate_and_keep_case() {
        let text = "Cammina ogni giorno";
        let toks = tokenize(text);
        let edits = phrase_edits(RewriteTables::builtin(), &toks, 0, 3, "cammina ogni giorno", 1);
        assert_eq!(edits[0].replacement, "Cammina con regolarità");
        assert_eq!(edits[0].range, 0..text.len());
        assert!(edits.iter().any(|e| e.replacement == "Tutti i giorni"
            || e.replacement == "tutti i giorni"));
    }

    #[test]
    fn synonyms_visit_middle_word_first() {
        let toks = tokenize("Passo ritmo respiro");
        let edits = lexical_edits(RewriteTables::builtin(), &toks, 0, 3, 0);
        let words: Vec<&str> = edits.iter().map(|e| e.replacement.as_str()).collect();
        assert_eq!(words, vec!["cadenza", "fiato", "Andatura"]);
    }
}
