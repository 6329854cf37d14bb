use super::{validate, Edit, RewriteCandidate, Strategy};
use crate::document::Document;
use crate::ngram::{NgramParams, NgramTally};
use crate::sentences::segment;
use crate::tables::{rotate, HotspotRule, RewriteTables};
use crate::textutil::{clean_for_match, preserve_case};
use crate::tokens::{find_phrase, phrase_words};
use crate::zone::ProtectedZone;

/// Table hotspot rules plus a cap on the topic phrase itself when it is three words or
/// longer.
#[must_use]
pub fn script_hotspots(tables: &RewriteTables, topic: &str) -> Vec<HotspotRule> {
    let mut rules = tables.hotspots.clone();
    if phrase_words(topic).len() >= 3 && !tables.anchors.topic_aliases.is_empty() {
        rules.push(HotspotRule {
            phrase: topic.to_string(),
            keep: 2,
            variants: tables.anchors.topic_aliases.clone(),
        });
    }
    rules
}

/// Replaces occurrences beyond each rule's `keep` that lie in the editable window, with
/// rotating variants. A variant that would create a new repeated n-gram is passed over.
pub fn cap_hotspots(
    doc: &mut Document,
    zone: &ProtectedZone,
    rules: &[HotspotRule],
    ngram: NgramParams,
) -> Vec<RewriteCandidate> {
    let mut committed = Vec::new();
    for rule in rules {
        let words = phrase_words(&rule.phrase);
        if words.is_empty() || rule.variants.is_empty() {
            continue;
        }
        let mut used = 0usize;
        loop {
            let tokens = doc.tokens();
            let hits = find_phrase(&tokens, &words);
            if hits.len() <= rule.keep {
                break;
            }
            let Some(window) = zone.window(doc.text(), &tokens) else {
                break;
            };
            let tally = NgramTally::new(&tokens, ngram);
            let pre = hits.len();

            let mut found = None;
            'hits: for &at in hits.iter().skip(rule.keep) {
                if !window.allows_words(at, at + words.len() - 1) {
                    continue;
                }
                let range = tokens[at].start..tokens[at + words.len() - 1].end;
                for k in 0..rule.variants.len() {
                    let Some(variant) = rotate(&rule.variants, used + k) else {
                        break;
                    };
                    let edit = Edit {
                        range: range.clone(),
                        replacement: preserve_case(&tokens[at].surface, variant),
                        strategy: Strategy::Hotspot,
                    };
                    let measured = validate(doc, &tokens, &tally, &window, &edit, pre, |_, t| {
                        find_phrase(t, &words).len()
                    });
                    if measured.is_some() {
                        found = measured;
                        break 'hits;
                    }
                }
            }

            let Some((next, cand)) = found else {
                break;
            };
            log::debug!("hotspot {:?} capped at byte {}", rule.phrase, cand.target.start);
            *doc = next;
            committed.push(cand);
            used += 1;
        }
    }
    committed
}

/// Removes editable sentences whose folded text equals a banned sentence.
pub fn remove_banned_sentences(
    doc: &mut Document,
    zone: &ProtectedZone,
    tables: &RewriteTables,
) -> usize {
    let banned = tables.banned_sentence_keys();
    if banned.is_empty() {
        return 0;
    }
    let tokens = doc.tokens();
    let Some(window) = zone.window(doc.text(), &tokens) else {
        return 0;
    };
    let targets: Vec<(usize, usize)> = segment(doc.text(), &tokens)
        .into_iter()
        .filter(|s| window.allows_bytes(s.start, s.end))
        .filter(|s| banned.contains(&clean_for_match(s.text(doc.text()))))
        .map(|s| (s.start, s.end))
        .collect();

    for &(start, end) in targets.iter().rev() {
        let text = doc.text();
        let trailing = text[end..].len() - text[end..].trim_start_matches([' ', '\t']).len();
        let end = (end + trailing).min(window.end);
        doc.splice(start..end, "");
    }
    if !targets.is_empty() {
        log::debug!("removed {} banned sentences", targets.len());
    }
    targets.len()
}

#[cfg(test)]
mod tests {
    use super::{cap_hotspots, remove_banned_sentences, script_hotspots};
    use crate::document::Document;
    use crate::ngram::NgramParams;
    use crate::tables::{HotspotRule, RewriteTables};
    use crate::zone::ProtectedZone;

    #[test]
    fn caps_phrase_beyond_keep() {
        let rule = HotspotRule {
            phrase: "alla fine".to_string(),
            keep: 2,
            variants: vec!["in chiusura".to_string(), "più tardi".to_string()],
        };
        let mut doc = Document::from_text("Alla fine uno. Alla fine due. Alla fine tre. Alla fine quattro.");
        let log = cap_hotspots(&mut doc, &ProtectedZone::none(), &[rule], NgramParams::default());
        assert_eq!(log.len(), 2);
        assert_eq!(
            doc.text(),
            "Alla fine uno. Alla fine due. In chiusura tre. Più tardi quattro."
        );
    }

    #[test]
    fn skips_variants_that_would_repeat() {
        let rule = HotspotRule {
            phrase: "alla fine".to_string(),
            keep: 0,
            variants: vec!["più tardi".to_string(), "in chiusura".to_string()],
        };
        let text = "Più tardi torni. Più tardi torni. Alla fine torni.";
        let mut doc = Document::from_text(text);
        let log = cap_hotspots(&mut doc, &ProtectedZone::none(), &[rule], NgramParams::default());
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].replacement, "In chiusura");
        assert_eq!(doc.text(), "Più tardi torni. Più tardi torni. In chiusura torni.");
    }

    #[test]
    fn topic_phrase_gets_its_own_cap() {
        let rules = script_hotspots(RewriteTables::builtin(), "camminare dopo i 60");
        assert!(rules.iter().any(|r| r.phrase == "camminare dopo i 60" && r.keep == 2));
        let short = script_hotspots(RewriteTables::builtin(), "camminare");
        assert!(!short.iter().any(|r| r.phrase == "camminare"));
    }

    #[test]
    fn drops_banned_sentences_in_editable_zone() {
        let mut doc = Document::from_text("Primo passo fatto. Ricapitoliamo. Poi si riparte piano.");
        let removed = remove_banned_sentences(&mut doc, &ProtectedZone::none(), RewriteTables::builtin());
        assert_eq!(removed, 1);
        assert_eq!(doc.text(), "Primo passo fatto. Poi si riparte piano.");
    }
}
