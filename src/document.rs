use std::ops::Range;

use serde::Serialize;

use crate::tokens::{tokenize, Token};

pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SegmentKind {
    Hook,
    Block(usize),
    Cta,
}

/// The script buffer. Segment start offsets travel with every splice so per-block
/// word counts stay readable after arbitrary edits.
#[derive(Clone, Debug)]
pub struct Document {
    text: String,
    segments: Vec<(SegmentKind, usize)>,
}

impl Document {
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: vec![(SegmentKind::Block(0), 0)],
        }
    }

    #[must_use]
    pub fn assemble(hook: &str, blocks: &[String], cta: &str) -> Self {
        let mut text = String::new();
        let mut segments = Vec::with_capacity(blocks.len() + 2);
        let mut push = |kind: SegmentKind, body: &str, text: &mut String| {
            let body = body.trim();
            if body.is_empty() {
                return;
            }
            if !text.is_empty() {
                text.push_str(PARAGRAPH_SEPARATOR);
            }
            segments.push((kind, text.len()));
            text.push_str(body);
        };
        push(SegmentKind::Hook, hook, &mut text);
        for (i, b) in blocks.iter().enumerate() {
            push(SegmentKind::Block(i), b, &mut text);
        }
        push(SegmentKind::Cta, cta, &mut text);
        if segments.is_empty() {
            segments.push((SegmentKind::Block(0), 0));
        }
        Self { text, segments }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    #[must_use]
    pub fn tokens(&self) -> Vec<Token> {
        tokenize(&self.text)
    }

    #[must_use]
    pub fn word_count(&self) -> usize {
        self.tokens().len()
    }

    /// Replaces `range` with `replacement`. Segments starting after the edit shift with
    /// it; segments starting inside a removed range collapse to the end of the
    /// replacement.
    pub fn splice(&mut self, range: Range<usize>, replacement: &str) {
        let old_len = range.end - range.start;
        let new_len = replacement.len();
        self.text.replace_range(range.clone(), replacement);
        for (_, start) in self.segments.iter_mut().skip(1) {
            if *start <= range.start {
                continue;
            }
            if *start >= range.end {
                *start = *start + new_len - old_len;
            } else {
                *start = range.start + new_len;
            }
        }
    }

    /// Replaces the whitespace run starting at `at` with `paragraph` set off by blank
    /// lines. Returns the byte range the paragraph body now occupies.
    pub fn insert_paragraph(&mut self, at: usize, paragraph: &str) -> Range<usize> {
        let rest = &self.text[at..];
        let ws_end = at + (rest.len() - rest.trim_start().len());
        let before = if at == 0 { "" } else { PARAGRAPH_SEPARATOR };
        let after = if ws_end >= self.text.len() {
            ""
        } else {
            PARAGRAPH_SEPARATOR
        };
        let body = paragraph.trim();
        self.splice(at..ws_end, &format!("{before}{body}{after}"));
        let start = at + before.len();
        start..start + body.len()
    }

    #[must_use]
    pub fn segments(&self) -> Vec<(SegmentKind, Range<usize>)> {
        let mut out = Vec::with_capacity(self.segments.len());
        for (i, (kind, start)) in self.segments.iter().enumerate() {
            let end = self
                .segments
                .get(i + 1)
                .map(|(_, s)| *s)
                .unwrap_or(self.text.len());
            out.push((*kind, *start..end.max(*start)));
        }
        out
    }

    #[must_use]
    pub fn block_texts(&self) -> Vec<&str> {
        self.segments()
            .into_iter()
            .filter(|(kind, _)| matches!(kind, SegmentKind::Block(_)))
            .map(|(_, r)| self.text[r].trim())
            .collect()
    }

    #[must_use]
    pub fn block_word_counts(&self) -> Vec<usize> {
        self.block_texts()
            .into_iter()
            .map(|b| tokenize(b).len())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Document;

    fn blocks() -> Vec<String> {
        vec![
            "Primo blocco breve.".to_string(),
            "Secondo blocco con qualche parola in piu.".to_string(),
        ]
    }

    #[test]
    fn assembles_with_paragraph_separators() {
        let doc = Document::assemble("Hook qui.", &blocks(), "Chiusura.");
        assert_eq!(
            doc.text(),
            "Hook qui.\n\nPrimo blocco breve.\n\nSecondo blocco con qualche parola in piu.\n\nChiusura."
        );
        assert_eq!(doc.block_word_counts(), vec![3, 7]);
    }

    #[test]
    fn splices_shift_following_segments() {
        let mut doc = Document::assemble("Hook qui.", &blocks(), "Chiusura.");
        let at = doc.text().find("breve").expect("find");
        doc.splice(at..at + "breve".len(), "molto lungo davvero");
        assert_eq!(doc.block_word_counts(), vec![5, 7]);
        assert_eq!(doc.block_texts()[1], "Secondo blocco con qualche parola in piu.");

        let cta = doc.text().find("\n\nChiusura").expect("find");
        doc.splice(cta..cta, "\n\nAggiunta in coda al secondo blocco.");
        assert_eq!(doc.block_word_counts(), vec![5, 13]);
        assert!(doc.text().ends_with("\n\nChiusura."));
    }

    #[test]
    fn inserted_paragraphs_replace_surrounding_whitespace() {
        let mut doc = Document::assemble("Hook qui.", &blocks(), "Chiusura.");
        let at = doc.text().find(" con").expect("find");
        let body = doc.insert_paragraph(at, "Nuovo paragrafo.");
        assert_eq!(&doc.text()[body], "Nuovo paragrafo.");
        assert!(doc
            .text()
            .contains("Secondo blocco\n\nNuovo paragrafo.\n\ncon qualche"));
        assert_eq!(doc.block_word_counts(), vec![3, 9]);

        let end = doc.text().len();
        doc.insert_paragraph(end, "Coda.");
        assert!(doc.text().ends_with("Chiusura.\n\nCoda."));
    }
}
