use serde::{Deserialize, Serialize};

use crate::tokens::Token;

/// Word windows at the start and end of a script that no automated edit may touch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedZone {
    pub head_words: usize,
    pub tail_words: usize,
}

/// The part of a text that lies strictly between the protected windows.
/// `first_word..end_word` are token indices, `start..end` byte offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditableWindow {
    pub first_word: usize,
    pub end_word: usize,
    pub start: usize,
    pub end: usize,
}

impl ProtectedZone {
    #[must_use]
    pub fn new(head_words: usize, tail_words: usize) -> Self {
        Self {
            head_words,
            tail_words,
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// `None` when the protected windows cover every word.
    #[must_use]
    pub fn window(&self, text: &str, tokens: &[Token]) -> Option<EditableWindow> {
        let n = tokens.len();
        if self.head_words + self.tail_words >= n && (n > 0 || self.head_words + self.tail_words > 0) {
            return None;
        }
        let start = if self.head_words == 0 {
            0
        } else {
            tokens[self.head_words - 1].end
        };
        let end = if self.tail_words == 0 {
            text.len()
        } else {
            tokens[n - self.tail_words].start
        };
        Some(EditableWindow {
            first_word: self.head_words,
            end_word: n - self.tail_words,
            start,
            end,
        })
    }

    /// Text of the protected head window (empty when nothing is protected).
    #[must_use]
    pub fn head_text<'a>(&self, text: &'a str, tokens: &[Token]) -> &'a str {
        if self.head_words == 0 || tokens.is_empty() {
            return "";
        }
        let last = self.head_words.min(tokens.len()) - 1;
        &text[..tokens[last].end]
    }

    #[must_use]
    pub fn tail_text<'a>(&self, text: &'a str, tokens: &[Token]) -> &'a str {
        if self.tail_words == 0 || tokens.is_empty() {
            return "";
        }
        let first = tokens.len() - self.tail_words.min(tokens.len());
        &text[tokens[first].start..]
    }
}

impl EditableWindow {
    #[must_use]
    pub fn word_len(&self) -> usize {
        self.end_word - self.first_word
    }

    #[must_use]
    pub fn allows_bytes(&self, start: usize, end: usize) -> bool {
        self.start <= start && end <= self.end && start <= end
    }

    /// Inclusive token range check.
    #[must_use]
    pub fn allows_words(&self, first: usize, last: usize) -> bool {
        first >= self.first_word && last < self.end_word && first <= last
    }
}

#[cfg(test)]
mod tests {
    use super::ProtectedZone;
    use crate::tokens::tokenize;

    #[test]
    fn window_sits_between_protected_words() {
        let text = "uno due tre quattro cinque sei";
        let toks = tokenize(text);
        let w = ProtectedZone::new(2, 1).window(text, &toks).expect("window");
        assert_eq!((w.first_word, w.end_word), (2, 5));
        assert_eq!(&text[w.start..w.end], " tre quattro cinque ");
        assert!(w.allows_words(2, 4));
        assert!(!w.allows_words(1, 3));
        assert_eq!(ProtectedZone::new(2, 1).head_text(text, &toks), "uno due");
        assert_eq!(ProtectedZone::new(2, 1).tail_text(text, &toks), "sei");
    }

    #[test]
    fn fully_protected_text_has_no_window() {
        let text = "uno due tre";
        let toks = tokenize(text);
        assert!(ProtectedZone::new(2, 1).window(text, &toks).is_none());
        let w = ProtectedZone::none().window(text, &toks).expect("window");
        assert_eq!((w.start, w.end), (0, text.len()));
    }
}
