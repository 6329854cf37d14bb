use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::textutil::normalize_word;

// Letters/digits with optional apostrophe-joined continuations (l'errore, dall'inizio, po').
static WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}][\p{L}\p{M}\p{N}]*(?:['\u{2019}][\p{L}\p{N}][\p{L}\p{M}\p{N}]*)*")
        .expect("word regex")
});

/// One word of the source text. `start`/`end` are byte offsets into the source and
/// always fall on char boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub surface: String,
    pub normalized: String,
    pub start: usize,
    pub end: usize,
}

/// Inclusive token range `[first, last]` with the byte bounds it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenSpan {
    pub first: usize,
    pub last: usize,
    pub start: usize,
    pub end: usize,
}

impl TokenSpan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.last + 1 - self.first
    }

    #[must_use]
    pub fn bytes(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[must_use]
pub fn tokenize(text: &str) -> Vec<Token> {
    WORD_RE
        .find_iter(text)
        .map(|m| Token {
            surface: m.as_str().to_string(),
            normalized: normalize_word(m.as_str()),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Rebuilds the source from token surfaces and the separator runs between them.
#[must_use]
pub fn reconstruct(text: &str, tokens: &[Token]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for t in tokens {
        out.push_str(&text[cursor..t.start]);
        out.push_str(&t.surface);
        cursor = t.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[must_use]
pub fn span_of(tokens: &[Token], first: usize, last: usize) -> Option<TokenSpan> {
    if first > last || last >= tokens.len() {
        return None;
    }
    Some(TokenSpan {
        first,
        last,
        start: tokens[first].start,
        end: tokens[last].end,
    })
}

/// Normalized words of a table phrase.
#[must_use]
pub fn phrase_words(phrase: &str) -> Vec<String> {
    tokenize(phrase).into_iter().map(|t| t.normalized).collect()
}

/// Start indices of non-overlapping matches of `words` in the token stream.
#[must_use]
pub fn find_phrase(tokens: &[Token], words: &[String]) -> Vec<usize> {
    let mut out = Vec::new();
    if words.is_empty() || tokens.len() < words.len() {
        return out;
    }
    let mut i = 0usize;
    while i + words.len() <= tokens.len() {
        if words
            .iter()
            .zip(&tokens[i..i + words.len()])
            .all(|(w, t)| *w == t.normalized)
        {
            out.push(i);
            i += words.len();
        } else {
            i += 1;
        }
    }
    out
}

/// Indices of the tokens lying entirely inside `bytes`.
#[must_use]
pub fn tokens_within(tokens: &[Token], bytes: Range<usize>) -> Range<usize> {
    let lo = tokens.partition_point(|t| t.start < bytes.start);
    let hi = tokens.partition_point(|t| t.end <= bytes.end);
    lo..hi.max(lo)
}

#[cfg(test)]
mod tests {
    use super::{find_phrase, phrase_words, reconstruct, span_of, tokenize, tokens_within};

    #[test]
    fn reconstruct_is_lossless() {
        let samples = [
            "",
            "   ",
            "Se dopo cinque minuti hai fiato corto, l'errore è partire forte!\n\nPiù avanti: ti mostro.",
            "dall’inizio... «tra poco» 50/60/70 anni — ok?\r\n\tfine",
            "e\u{301} composto",
        ];
        for s in samples {
            let toks = tokenize(s);
            assert_eq!(reconstruct(s, &toks), s);
        }
    }

    #[test]
    fn keeps_elisions_as_single_tokens() {
        let toks = tokenize("L'errore dall’inizio è un po' caro");
        let surfaces: Vec<&str> = toks.iter().map(|t| t.surface.as_str()).collect();
        assert_eq!(surfaces, vec!["L'errore", "dall’inizio", "è", "un", "po", "caro"]);
        assert_eq!(toks[0].normalized, "l'errore");
        assert_eq!(toks[1].normalized, "dall'inizio");
        assert_eq!(toks[2].normalized, "e");
    }

    #[test]
    fn spans_map_back_to_source() {
        let s = "Mantieni il ritmo stabile.";
        let toks = tokenize(s);
        let span = span_of(&toks, 1, 3).expect("span");
        assert_eq!(&s[span.bytes()], "il ritmo stabile");
        assert_eq!(span.len(), 3);
        assert_eq!(tokens_within(&toks, 0..12), 0..2);
    }

    #[test]
    fn finds_non_overlapping_phrases() {
        let toks = tokenize("Alla fine, alla fine alla FINE.");
        let words = phrase_words("alla fine");
        assert_eq!(find_phrase(&toks, &words), vec![0, 2, 4]);
        assert!(find_phrase(&toks, &phrase_words("più avanti")).is_empty());
    }
}
