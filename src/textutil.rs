use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static SPACE_BEFORE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([,.;:!?])").expect("space before punct regex"));
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("multi space regex"));
static COMMA_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",(?:[ \t]*,)+").expect("comma run regex"));
static STOP_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?]),").expect("stop comma regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank lines regex"));

/// Strips combining marks after canonical decomposition and folds typographic quotes.
/// Case is kept.
#[must_use]
pub fn fold_diacritics(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => '"',
            other => other,
        })
        .collect()
}

/// Matching form of a single word: folded, lowercased, letters/digits/apostrophes only.
#[must_use]
pub fn normalize_word(word: &str) -> String {
    fold_diacritics(word)
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || *c == '\'')
        .collect()
}

/// Folded, lowercased text with every non-alphanumeric run collapsed to one space.
#[must_use]
pub fn clean_for_match(text: &str) -> String {
    let folded: String = fold_diacritics(text)
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[must_use]
pub fn word_count(text: &str) -> usize {
    crate::tokens::tokenize(text).len()
}

/// Applies the capitalization of `source` to `replacement`: all-caps stays all-caps,
/// a leading capital is carried over, anything else is returned as is.
#[must_use]
pub fn preserve_case(source: &str, replacement: &str) -> String {
    let letters: Vec<char> = source.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    match source.chars().find(|c| c.is_alphabetic()) {
        Some(first) if first.is_uppercase() => capitalize_first(replacement),
        _ => replacement.to_string(),
    }
}

#[must_use]
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[must_use]
pub fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[must_use]
pub fn ensure_terminal_punct(text: &str) -> String {
    let t = text.trim_end();
    if t.is_empty() || t.ends_with(['.', '!', '?']) {
        return t.to_string();
    }
    format!("{t}.")
}

/// Replaces `{key}` slots in a table template.
#[must_use]
pub fn fill_slots(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        out = out.replace(&format!("{{{k}}}"), v);
    }
    out
}

/// Collapses horizontal whitespace and repairs punctuation left behind by edits.
/// Newlines are kept, runs of blank lines are reduced to one.
#[must_use]
pub fn cleanup_sentence_spacing(text: &str) -> String {
    let out = SPACE_BEFORE_PUNCT_RE.replace_all(text, "$1");
    let out = COMMA_RUN_RE.replace_all(&out, ",");
    let out = STOP_COMMA_RE.replace_all(&out, "$1");
    let out = MULTI_SPACE_RE.replace_all(&out, " ");
    let out = BLANK_LINES_RE.replace_all(&out, "\n\n");
    out.trim().to_string()
}
