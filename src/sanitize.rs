use encoding_rs::{UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::{Document, PARAGRAPH_SEPARATOR};
use crate::sentences::segment;
use crate::zone::ProtectedZone;

static MOJIBAKE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ÔÇ|â€|Ã.|Â.|├.|\u{FFFD}").expect("mojibake regex"));
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\[[^\]\n]{1,40}\][ \t]*:?").expect("label regex"));
static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:hook|intro|introduzione|parte|sezione|conclusione|cta)[ \t]*[:\-][ \t]*")
        .expect("heading regex")
});
static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control regex"));
static HSPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n\t]+").expect("hspace regex"));
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));

const SEQUENCE_FIXES: &[(&str, &str)] = &[
    ("ÔÇ£", "\""),
    ("ÔÇØ", "\""),
    ("ÔÇÖ", "'"),
    ("ÔÇô", "-"),
    ("â€œ", "\""),
    ("â€™", "'"),
    ("â€“", "-"),
    ("â€¦", "..."),
    ("â€", "\""),
    // cp437 renderings of Italian accented vowels
    ("├á", "à"),
    ("├®", "è"),
    ("├¬", "ì"),
    ("├▓", "ò"),
    ("├╣", "ù"),
    ("├À", "À"),
    ("├ê", "È"),
    ("├ì", "Ì"),
    ("├Ò", "Ò"),
    ("├Ù", "Ù"),
];

fn mojibake_score(s: &str) -> usize {
    MOJIBAKE_RE.find_iter(s).count()
}

/// Repairs UTF-8 text that was decoded as Windows-1252 somewhere upstream, then patches
/// the quote and cp437 sequences a round trip cannot recover.
#[must_use]
pub fn fix_mojibake(input: &str) -> String {
    if mojibake_score(input) == 0 {
        return input.to_string();
    }
    let mut candidate = input.to_string();
    let (bytes, _, unmappable) = WINDOWS_1252.encode(input);
    if !unmappable {
        if let Some(decoded) = UTF_8.decode_without_bom_handling_and_without_replacement(&bytes) {
            if mojibake_score(&decoded) < mojibake_score(&candidate) {
                candidate = decoded.into_owned();
            }
        }
    }
    for (bad, good) in SEQUENCE_FIXES {
        if candidate.contains(bad) {
            candidate = candidate.replace(bad, good);
        }
    }
    candidate
}

/// Strips `[Label]:` markers, section headings and control characters; collapses blank
/// line runs.
#[must_use]
pub fn clean_labels(raw: &str) -> String {
    let s = raw.replace("\r\n", "\n").replace('\r', "\n");
    let s = HSPACE_RE.replace_all(&s, " ");
    let s = CONTROL_RE.replace_all(&s, "");
    let s = LABEL_RE.replace_all(&s, "");
    let s = HEADING_RE.replace_all(&s, "");
    let s = BLANK_RUN_RE.replace_all(&s, "\n\n");
    s.trim().to_string()
}

#[must_use]
pub fn clean_block(raw: &str) -> String {
    clean_labels(&fix_mojibake(raw))
}

/// Breaks paragraphs so none holds more than `per_paragraph` sentences. Only the
/// whitespace between two editable sentences is ever replaced. Returns the number of
/// breaks inserted.
pub fn layout_paragraphs(doc: &mut Document, zone: &ProtectedZone, per_paragraph: usize) -> usize {
    if per_paragraph == 0 {
        return 0;
    }
    let tokens = doc.tokens();
    let Some(window) = zone.window(doc.text(), &tokens) else {
        return 0;
    };
    let text = doc.text();
    let sentences = segment(text, &tokens);

    let mut breaks: Vec<(usize, usize)> = Vec::new();
    let mut run = 1usize;
    for pair in sentences.windows(2) {
        let (gap_start, gap_end) = (pair[0].end, pair[1].start);
        let gap = &text[gap_start..gap_end];
        if gap.contains('\n') {
            run = 1;
            continue;
        }
        if run >= per_paragraph && gap.trim().is_empty() && window.allows_bytes(gap_start, gap_end) {
            breaks.push((gap_start, gap_end));
            run = 1;
        } else {
            run += 1;
        }
    }

    for &(start, end) in breaks.iter().rev() {
        doc.splice(start..end, PARAGRAPH_SEPARATOR);
    }
    if !breaks.is_empty() {
        log::debug!("layout: {} paragraph breaks", breaks.len());
    }
    breaks.len()
}

#[cfg(test)]
mod tests {
    use super::{clean_labels, fix_mojibake, layout_paragraphs};
    use crate::document::Document;
    use crate::tokens::tokenize;
    use crate::zone::ProtectedZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn repairs_latin1_roundtrip() {
        assert_eq!(fix_mojibake("perchÃ© cosÃ¬ Ã¨ facile"), "perché così è facile");
        assert_eq!(fix_mojibake("gi├á fatto"), "già fatto");
        assert_eq!(fix_mojibake("già fatto"), "già fatto");
    }

    #[test]
    fn strips_labels_and_headings() {
        let raw = "[Hook]: Primo passo.\r\nCTA: iscriviti\n\n\n\nFine\u{0007}.";
        assert_eq!(clean_labels(raw), "Primo passo.\niscriviti\n\nFine.");
    }

    #[test]
    fn splits_long_paragraphs_with_whitespace_only() {
        let text = "Uno due. Tre quattro. Cinque sei. Sette otto. Nove dieci.";
        let mut doc = Document::from_text(text);
        let n = layout_paragraphs(&mut doc, &ProtectedZone::none(), 2);
        assert_eq!(n, 2);
        assert_eq!(doc.text(), "Uno due. Tre quattro.\n\nCinque sei. Sette otto.\n\nNove dieci.");
        let before: Vec<String> = tokenize(text).into_iter().map(|t| t.surface).collect();
        let after: Vec<String> = doc.tokens().into_iter().map(|t| t.surface).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn layout_keeps_protected_head() {
        let text = "Uno due. Tre quattro. Cinque sei. Sette otto.";
        let mut doc = Document::from_text(text);
        let n = layout_paragraphs(&mut doc, &ProtectedZone::new(7, 0), 2);
        assert_eq!(n, 0);
        assert_eq!(doc.text(), text);
    }
}
