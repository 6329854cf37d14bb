use regex::Regex;

use super::{Edit, Strategy};
use crate::sentences::Sentence;
use crate::tables::{rotate, RewriteTables};
use crate::textutil::{
    capitalize_first, cleanup_sentence_spacing, fill_slots, lowercase_first, normalize_word,
};
use crate::tokens::phrase_words;
use crate::zone::EditableWindow;

fn contains_words(signature: &str, phrase: &str) -> bool {
    let words = phrase_words(phrase).join(" ");
    !words.is_empty() && format!(" {signature} ").contains(&format!(" {words} "))
}

/// Whole-sentence rewrites for the sentence holding token `pos`, when that sentence
/// carries one of the templated bridge hints.
pub(super) fn sentence_edits(
    text: &str,
    sentences: &[Sentence],
    pos: usize,
    tables: &RewriteTables,
    rotation: usize,
    window: &EditableWindow,
) -> Vec<Edit> {
    let Some(s) = sentences.iter().find(|s| s.tokens.contains(&pos)) else {
        return Vec::new();
    };
    if !window.allows_bytes(s.start, s.end) {
        return Vec::new();
    }
    if !tables
        .sentence
        .hints
        .iter()
        .any(|h| contains_words(&s.signature, h))
    {
        return Vec::new();
    }
    let body = s.text(text);
    [
        bridge_to_direct(body, tables, rotation),
        invert_cause_effect(body, tables),
        strip_fillers(body, tables),
    ]
    .into_iter()
    .flatten()
    .filter(|r| r != body)
    .map(|replacement| Edit {
        range: s.bytes(),
        replacement,
        strategy: Strategy::Sentence,
    })
    .collect()
}

/// "ti aiuta a respirare meglio" -> "così respiri meglio".
pub(crate) fn bridge_to_direct(body: &str, tables: &RewriteTables, rotation: usize) -> Option<String> {
    let st = &tables.sentence;
    let re = st.bridge_pattern.as_ref()?;
    let caps = re.captures(body)?;
    let whole = caps.get(0)?;
    let verb = caps.name("verb")?.as_str();
    let rest = caps.name("rest").map_or("", |m| m.as_str());
    let option = rotation % 2;
    let phrase = match st.infinitives.get(&normalize_word(verb)) {
        Some(present) => fill_slots(
            rotate(&st.direct_templates, option)?,
            &[("present", present), ("rest", rest)],
        ),
        None => fill_slots(
            rotate(&st.fallback_templates, option)?,
            &[("verb", verb), ("rest", rest)],
        ),
    };
    let head = body[..whole.start()].trim_end();
    let tail = &body[whole.end()..];
    let out = if head.is_empty() {
        format!("{}{}", capitalize_first(phrase.trim()), tail)
    } else {
        format!("{head} {}{}", phrase.trim(), tail)
    };
    Some(cleanup_sentence_spacing(&out))
}

/// "X, e questo significa Y." -> "Y: quindi x."
pub(crate) fn invert_cause_effect(body: &str, tables: &RewriteTables) -> Option<String> {
    let st = &tables.sentence;
    let re = st.inversion_pattern.as_ref()?;
    let template = st.inversion_template.as_deref()?;
    let caps = re.captures(body)?;
    let cause = caps.name("cause")?.as_str().trim();
    let effect = caps.name("effect")?.as_str().trim();
    if cause.is_empty() || effect.is_empty() {
        return None;
    }
    let punct = caps.name("punct").map_or(".", |m| m.as_str());
    let out = fill_slots(
        template,
        &[
            ("effect", effect),
            ("cause", &lowercase_first(cause)),
            ("punct", punct),
        ],
    );
    Some(capitalize_first(&cleanup_sentence_spacing(&out)))
}

pub(crate) fn strip_fillers(body: &str, tables: &RewriteTables) -> Option<String> {
    let mut out = body.to_string();
    for filler in &tables.sentence.fillers {
        let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b,?\s*", regex::escape(filler))) else {
            continue;
        };
        out = re.replace_all(&out, "").into_owned();
    }
    if out == body {
        return None;
    }
    let out = capitalize_first(&cleanup_sentence_spacing(&out));
    if out.chars().filter(|c| c.is_alphanumeric()).count() == 0 {
        return None;
    }
    Some(out)
}
