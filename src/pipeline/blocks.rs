//! Turns raw model blocks into exactly `n` cleaned, anchored, audience-safe segments of at
//! least the per-block minimum length.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::budget::PadState;
use crate::cues::strip_legacy_cues;
use crate::error::ScriptError;
use crate::ngram::{window_keys, NgramParams, NgramTally};
use crate::sanitize::clean_block;
use crate::sentences::{segment, signature};
use crate::tables::{rotate, RewriteTables};
use crate::textutil::{clean_for_match, ensure_terminal_punct, fill_slots, preserve_case, word_count};
use crate::tokens::{tokenize, Token};

pub const ALLOWED_TYPES: &[&str] = &["howto", "protocol", "myth", "mistakes", "checklist", "story"];
pub const DEFAULT_TYPE: &str = "howto";
pub const DEFAULT_AUDIENCE: &str = "over60";

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z0-9_-]*\s*\n?(.*?)\n?```\s*$").expect("fence regex"));

/// Lowercased type; anything outside [`ALLOWED_TYPES`] becomes `howto`.
#[must_use]
pub fn normalize_type(raw: &str) -> String {
    let t = raw.trim().to_ascii_lowercase();
    if ALLOWED_TYPES.contains(&t.as_str()) {
        t
    } else {
        DEFAULT_TYPE.to_string()
    }
}

/// Maps `over 70`, `70+` and similar spellings onto a table audience key.
#[must_use]
pub fn normalize_audience(raw: &str, tables: &RewriteTables) -> String {
    let compact: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '+')
        .collect();
    if tables.audiences.contains_key(&compact) {
        return compact;
    }
    let prefixed = format!("over{compact}");
    if tables.audiences.contains_key(&prefixed) {
        return prefixed;
    }
    if !compact.is_empty() {
        log::debug!("unknown audience {raw:?}, using {DEFAULT_AUDIENCE}");
    }
    DEFAULT_AUDIENCE.to_string()
}

/// `(seed + offset) mod len` without overflowing on large seeds.
pub(crate) fn seeded(seed: u64, offset: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    ((seed % len as u64) as usize + offset % len) % len
}

fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    match FENCE_RE.captures(t).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => t,
    }
}

/// Parses `{"blocks": [...]}` out of a model reply. Code fences and chatter around the
/// outermost object are tolerated; non-string items are coerced to strings.
pub fn parse_model_blocks(text: &str) -> Result<Vec<String>, ScriptError> {
    let body = strip_fences(text);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let (Some(open), Some(close)) = (body.find('{'), body.rfind('}')) else {
                return Err(ScriptError::format("invalid_json_root"));
            };
            if close <= open {
                return Err(ScriptError::format("invalid_json_root"));
            }
            serde_json::from_str(&body[open..=close])
                .map_err(|_| ScriptError::format("invalid_json_root"))?
        }
    };
    let Value::Object(map) = value else {
        return Err(ScriptError::format("invalid_json_root"));
    };
    let Some(Value::Array(items)) = map.get("blocks") else {
        return Err(ScriptError::format("missing_blocks_array"));
    };
    if items.is_empty() {
        return Err(ScriptError::format("blocks_empty"));
    }
    Ok(items
        .iter()
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect())
}

/// Inputs shared by the block builders.
#[derive(Clone, Copy, Debug)]
pub struct BlockSource<'a> {
    pub tables: &'a RewriteTables,
    pub topic: &'a str,
    pub audience: &'a str,
    pub script_type: &'a str,
    pub anchors: &'a [String],
    pub seed: u64,
}

impl BlockSource<'_> {
    fn anchor(&self, index: usize) -> &str {
        rotate(self.anchors, index)
            .or_else(|| self.tables.anchors.fallback.first())
            .map(String::as_str)
            .unwrap_or("ritmo")
    }

    fn golden(&self, index: usize) -> Option<String> {
        let template = rotate(&self.tables.blocks.golden, index)?;
        Some(fill_slots(
            template,
            &[("topic", self.topic), ("anchor", self.anchor(index))],
        ))
    }
}

/// Exactly `n` blocks: extras dropped, missing or blank ones replaced by golden templates.
#[must_use]
pub fn stitch_blocks(blocks: &[String], n: usize, src: &BlockSource<'_>) -> Vec<String> {
    (0..n)
        .map(|i| {
            let b = blocks.get(i).map(|s| s.trim()).unwrap_or("");
            if b.is_empty() {
                src.golden(i).unwrap_or_default()
            } else {
                b.to_string()
            }
        })
        .collect()
}

/// Per-block padding knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockParams {
    pub segments: usize,
    pub min_words: usize,
    pub attempts: usize,
    pub ngram: NgramParams,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            segments: 7,
            min_words: 170,
            attempts: 40,
            ngram: NgramParams::default(),
        }
    }
}

/// Padding paragraph `k`. Intro, audience voice, two details and the type variant rotate
/// through their pools independently; the intro anchor shifts by one on every lap of the
/// intro pool.
#[must_use]
pub fn topic_padding_paragraph(src: &BlockSource<'_>, k: usize) -> Option<String> {
    let tables = src.tables;
    let intros = &tables.blocks.intros;
    let lap = k / intros.len().max(1);
    let intro = fill_slots(
        rotate(intros, k)?,
        &[("topic", src.topic), ("anchor", src.anchor(k + lap))],
    );
    let voices = tables
        .audience(src.audience)
        .map(|p| p.padding_voices.as_slice())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| tables.pad_voices(src.audience));
    let details = &tables.blocks.details;
    let mut parts = vec![intro];
    parts.extend(
        [
            rotate(voices, k),
            rotate(details, 2 * k),
            rotate(details, 2 * k + 1),
            rotate(tables.block_variants(src.script_type), k),
        ]
        .into_iter()
        .flatten()
        .cloned(),
    );
    Some(parts.join(" "))
}

fn last_tokens(mut tokens: Vec<Token>, keep: usize) -> Vec<Token> {
    let cut = tokens.len().saturating_sub(keep);
    tokens.split_off(cut)
}

/// Sentence signatures and n-gram counts of every block, so padding never repeats a
/// sentence and never lifts an n-gram to the repeat threshold.
struct PadGuard {
    seen: BTreeSet<String>,
    tally: NgramTally,
}

impl PadGuard {
    fn new(blocks: &[String], ngram: NgramParams) -> Self {
        let joined = blocks.join("\n\n");
        let tokens = tokenize(&joined);
        let seen = segment(&joined, &tokens)
            .into_iter()
            .map(|s| s.signature)
            .collect();
        Self {
            seen,
            tally: NgramTally::new(&tokens, ngram),
        }
    }

    /// The sentences of `para` that may go between `left` and `right`, in order. Each
    /// admitted sentence is recorded before the next one is checked.
    fn admit(&mut self, para: &str, mut left: Vec<Token>, right: &[Token]) -> Vec<String> {
        let n = self.tally.params().size;
        let tokens = tokenize(para);
        let mut kept = Vec::new();
        for s in segment(para, &tokens) {
            if s.signature.is_empty() || self.seen.contains(&s.signature) {
                continue;
            }
            let mut grown = left.clone();
            grown.extend_from_slice(&tokens[s.tokens.clone()]);
            let removed = window_keys(&[left.as_slice(), right].concat(), n);
            let added = window_keys(&[grown.as_slice(), right].concat(), n);
            if self.tally.lifts(&removed, &added) {
                continue;
            }
            self.tally.record(&removed, &added);
            self.seen.insert(s.signature.clone());
            kept.push(s.text(para).to_string());
            left = last_tokens(grown, n.saturating_sub(1));
        }
        kept
    }
}

/// Grows block `index` with padding paragraphs until it has `min_words` words or
/// `attempts` candidates were tried. Paragraph signatures are never reused within a run;
/// sentences already present in any block, or that would lift an n-gram to the repeat
/// threshold, are dropped from the candidate. Returns the paragraphs added.
pub fn ensure_block_min_words(
    blocks: &mut [String],
    index: usize,
    src: &BlockSource<'_>,
    state: &mut PadState,
    params: &BlockParams,
) -> usize {
    let Some(block) = blocks.get(index) else {
        return 0;
    };
    let mut out = block.trim().to_string();
    if out.is_empty() {
        out = src.golden(index).unwrap_or_default();
        blocks[index] = out.clone();
    }
    let keep = params.ngram.size.saturating_sub(1);
    let mut guard = PadGuard::new(blocks, params.ngram);
    let right: Vec<Token> = blocks
        .get(index + 1)
        .map(|b| tokenize(b).into_iter().take(keep).collect())
        .unwrap_or_default();

    let mut added = 0usize;
    let mut tried = 0usize;
    while word_count(&out) < params.min_words && tried < params.attempts {
        let k = index + state.next;
        state.next += 1;
        tried += 1;
        let Some(para) = topic_padding_paragraph(src, k) else {
            break;
        };
        let sig = signature(&para);
        if sig.is_empty() || !state.used.insert(sig) {
            continue;
        }
        let kept = guard.admit(&para, last_tokens(tokenize(&out), keep), &right);
        if kept.is_empty() {
            continue;
        }
        let para = kept.join(" ");
        out = if out.is_empty() {
            para
        } else {
            format!("{}\n\n{para}", ensure_terminal_punct(&out))
        };
        added += 1;
    }
    if word_count(&out) < params.min_words {
        log::warn!(
            "block {} stays at {} words after {tried} padding attempts",
            index + 1,
            word_count(&out)
        );
    }
    blocks[index] = out;
    added
}

fn append_line(block: &str, line: &str) -> String {
    let base = ensure_terminal_punct(block);
    if base.is_empty() {
        line.to_string()
    } else {
        format!("{base} {line}")
    }
}

/// Topic anchors: bigrams of content words first, then single words, then the fallback
/// pool, up to the table maximum.
#[must_use]
pub fn extract_anchors(topic: &str, tables: &RewriteTables) -> Vec<String> {
    let max = tables.anchors.max.unwrap_or(6).max(1);
    let stop = &tables.anchors.stopwords;
    let words: Vec<String> = clean_for_match(topic)
        .split_whitespace()
        .filter(|w| w.chars().count() >= 3 && !stop.iter().any(|s| s == w))
        .map(str::to_string)
        .collect();

    let mut anchors: Vec<String> = Vec::new();
    for pair in words.windows(2) {
        if anchors.len() >= max {
            break;
        }
        let two = format!("{} {}", pair[0], pair[1]);
        if two.contains("anni") || anchors.contains(&two) {
            continue;
        }
        anchors.push(two);
    }
    for w in &words {
        if anchors.len() >= max {
            break;
        }
        if w != "anni" && !anchors.contains(w) {
            anchors.push(w.clone());
        }
    }
    for f in &tables.anchors.fallback {
        if anchors.len() >= max {
            break;
        }
        if !anchors.contains(f) {
            anchors.push(f.clone());
        }
    }
    anchors
}

/// Block `i` must mention anchor `(i + seed) mod len`; when it does not, a cue line naming
/// it is appended. A cue line already appended to an earlier block moves on to the next cue.
pub fn enforce_anchors(blocks: &mut [String], src: &BlockSource<'_>) -> usize {
    let cues = &src.tables.blocks.anchor_cues;
    if src.anchors.is_empty() || cues.is_empty() {
        return 0;
    }
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut added = 0usize;
    for (i, block) in blocks.iter_mut().enumerate() {
        let anchor = &src.anchors[seeded(src.seed, i, src.anchors.len())];
        if clean_for_match(block).contains(anchor.as_str()) {
            continue;
        }
        let lines: Vec<String> = (0..cues.len())
            .map(|j| fill_slots(&cues[seeded(src.seed, i + j, cues.len())], &[("anchor", anchor)]))
            .collect();
        let line = lines
            .iter()
            .find(|l| !used.contains(&signature(l)))
            .unwrap_or(&lines[0]);
        used.insert(signature(line));
        *block = append_line(block, line);
        added += 1;
    }
    added
}

/// `howto`/`mistakes` packs: one line each on blocks 3, 4 and 5, anchors rotated from the
/// seed.
pub fn apply_type_pack(blocks: &mut [String], src: &BlockSource<'_>) -> usize {
    let Some(pack) = src.tables.types.get(src.script_type).map(|t| &t.pack) else {
        return 0;
    };
    let mut added = 0usize;
    for (j, line) in pack.iter().enumerate() {
        let Some(block) = blocks.get_mut(2 + j) else {
            break;
        };
        let anchor = if src.anchors.is_empty() {
            src.anchor(j).to_string()
        } else {
            src.anchors[seeded(src.seed, j, src.anchors.len())].clone()
        };
        *block = append_line(block, &fill_slots(line, &[("anchor", &anchor)]));
        added += 1;
    }
    added
}

/// Word-bounded, case-insensitive pattern for a folded table term that also matches the
/// accented spelling.
fn accent_insensitive(term: &str) -> Option<Regex> {
    let folded = clean_for_match(term);
    if folded.is_empty() {
        return None;
    }
    let mut pat = String::from(r"(?i)\b");
    for (i, word) in folded.split_whitespace().enumerate() {
        if i > 0 {
            pat.push_str(r"\s+");
        }
        for c in word.chars() {
            match c {
                'a' => pat.push_str("[aàá]"),
                'e' => pat.push_str("[eèé]"),
                'i' => pat.push_str("[iìí]"),
                'o' => pat.push_str("[oòó]"),
                'u' => pat.push_str("[uùú]"),
                other => pat.push_str(&regex::escape(&other.to_string())),
            }
        }
    }
    pat.push_str(r"\b");
    Regex::new(&pat).ok()
}

/// Replaces the audience's forbidden terms and adds its voice line to the first block.
/// Returns the number of replacements made.
pub fn apply_audience_vocab(blocks: &mut [String], src: &BlockSource<'_>) -> usize {
    let Some(profile) = src.tables.audience(src.audience) else {
        return 0;
    };
    let fallback = profile.fallback_replacement.as_deref().unwrap_or("controllo");
    let rules: Vec<(Regex, &str)> = profile
        .forbidden
        .iter()
        .filter_map(|term| {
            let key = clean_for_match(term);
            let replacement = profile
                .replacements
                .get(&key)
                .or_else(|| profile.replacements.get(term))
                .map(String::as_str)
                .unwrap_or(fallback);
            accent_insensitive(term).map(|re| (re, replacement))
        })
        .collect();

    let mut replaced = 0usize;
    for block in blocks.iter_mut() {
        for (re, replacement) in &rules {
            let hits = re.find_iter(block).count();
            if hits == 0 {
                continue;
            }
            replaced += hits;
            *block = re
                .replace_all(block, |caps: &regex::Captures<'_>| preserve_case(&caps[0], replacement))
                .into_owned();
        }
    }
    if let (Some(first), Some(voice)) = (blocks.first_mut(), profile.voice_line.as_deref()) {
        if !clean_for_match(first).contains(&clean_for_match(voice)) {
            *first = append_line(first, voice);
        }
    }
    replaced
}

/// Counters reported by [`structure_blocks`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructureReport {
    pub anchor_cues: usize,
    pub pack_lines: usize,
    pub vocab_replacements: usize,
    pub padding_paragraphs: usize,
}

/// Full block structuring: sanitize, strip legacy cues, stitch to `n`, anchors, type pack,
/// audience vocabulary, then the per-block minimum.
pub fn structure_blocks(
    raw: &[String],
    src: &BlockSource<'_>,
    params: &BlockParams,
    state: &mut PadState,
) -> (Vec<String>, StructureReport) {
    let cleaned: Vec<String> = raw
        .iter()
        .map(|b| strip_legacy_cues(&clean_block(b), &src.tables.cues.legacy))
        .collect();
    let mut blocks = stitch_blocks(&cleaned, params.segments, src);
    let mut report = StructureReport {
        anchor_cues: enforce_anchors(&mut blocks, src),
        pack_lines: apply_type_pack(&mut blocks, src),
        vocab_replacements: apply_audience_vocab(&mut blocks, src),
        padding_paragraphs: 0,
    };
    for i in 0..blocks.len() {
        report.padding_paragraphs += ensure_block_min_words(&mut blocks, i, src, state, params);
    }
    (blocks, report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{
        apply_audience_vocab, apply_type_pack, enforce_anchors, ensure_block_min_words,
        extract_anchors, normalize_audience, normalize_type, parse_model_blocks, stitch_blocks,
        structure_blocks, topic_padding_paragraph, BlockParams, BlockSource,
    };
    use crate::budget::PadState;
    use crate::ngram::find_repeated;
    use crate::sentences::segment;
    use crate::tables::RewriteTables;
    use crate::textutil::word_count;
    use crate::tokens::tokenize;

    fn source<'a>(anchors: &'a [String], script_type: &'a str) -> BlockSource<'a> {
        BlockSource {
            tables: RewriteTables::builtin(),
            topic: "camminare dopo i 60",
            audience: "over60",
            script_type,
            anchors,
            seed: 0,
        }
    }

    #[test]
    fn parses_fenced_json_and_coerces_items() {
        let text = "```json\n{\"blocks\": [\"uno\", 2, null]}\n```";
        assert_eq!(parse_model_blocks(text).unwrap(), vec!["uno", "2", ""]);
        let chatty = "Ecco il risultato: {\"blocks\": [\"a\"]} spero vada bene";
        assert_eq!(parse_model_blocks(chatty).unwrap(), vec!["a"]);
    }

    #[test]
    fn format_errors_carry_reasons() {
        let reason = |t: &str| parse_model_blocks(t).unwrap_err().to_string();
        assert!(reason("[1, 2]").contains("invalid_json_root"));
        assert!(reason("non json").contains("invalid_json_root"));
        assert!(reason("{\"items\": []}").contains("missing_blocks_array"));
        assert!(reason("{\"blocks\": []}").contains("blocks_empty"));
    }

    #[test]
    fn types_and_audiences_normalize() {
        let tables = RewriteTables::builtin();
        assert_eq!(normalize_type(" Mistakes "), "mistakes");
        assert_eq!(normalize_type("listicle"), "howto");
        assert_eq!(normalize_audience("Over 70", tables), "over70");
        assert_eq!(normalize_audience("50+", tables), "over50");
        assert_eq!(normalize_audience("teens", tables), "over60");
    }

    #[test]
    fn anchors_prefer_bigrams_then_words_then_fallback() {
        let tables = RewriteTables::builtin();
        assert_eq!(
            extract_anchors("Camminare dopo i 60 anni", tables),
            vec!["camminare", "ritmo", "respiro", "passo", "stabilita", "energia"]
        );
        assert_eq!(
            extract_anchors("respirazione diaframmatica lenta", tables)[..4],
            [
                "respirazione diaframmatica",
                "diaframmatica lenta",
                "respirazione",
                "diaframmatica"
            ]
        );
    }

    #[test]
    fn stitch_truncates_and_fills() {
        let anchors = vec!["ritmo".to_string()];
        let src = source(&anchors, "howto");
        let many: Vec<String> = (0..9).map(|i| format!("Blocco {i}.")).collect();
        assert_eq!(stitch_blocks(&many, 7, &src).len(), 7);
        let few = vec!["Solo uno.".to_string(), "  ".to_string()];
        let out = stitch_blocks(&few, 3, &src);
        assert_eq!(out[0], "Solo uno.");
        assert!(out[1].contains("camminare dopo i 60"));
        assert!(!out[2].is_empty());
    }

    #[test]
    fn short_blocks_grow_without_reusing_paragraphs() {
        let anchors = vec!["ritmo".to_string(), "respiro".to_string()];
        let src = source(&anchors, "howto");
        let mut state = PadState::default();
        let mut blocks = vec!["Breve.".to_string(), "Breve anche questo.".to_string()];
        let params = BlockParams::default();
        assert!(ensure_block_min_words(&mut blocks, 0, &src, &mut state, &params) > 0);
        assert!(ensure_block_min_words(&mut blocks, 1, &src, &mut state, &params) > 0);
        assert!(word_count(&blocks[0]) >= 170);
        assert!(word_count(&blocks[1]) >= 170);
        let paras_a: Vec<&str> = blocks[0].split("\n\n").skip(1).collect();
        for p in blocks[1].split("\n\n").skip(1) {
            assert!(!paras_a.contains(&p));
        }
    }

    #[test]
    fn padding_never_repeats_a_sentence_or_a_trigram() {
        let anchors = vec!["camminare".to_string(), "ritmo".to_string()];
        let src = source(&anchors, "howto");
        let mut state = PadState::default();
        let mut blocks: Vec<String> = (0..7).map(|i| format!("Parte {i} del racconto.")).collect();
        let params = BlockParams::default();
        for i in 0..blocks.len() {
            ensure_block_min_words(&mut blocks, i, &src, &mut state, &params);
        }
        let joined = blocks.join("\n\n");
        let tokens = tokenize(&joined);
        let mut seen = BTreeSet::new();
        for s in segment(&joined, &tokens) {
            assert!(seen.insert(s.signature.clone()), "repeated: {}", s.text(&joined));
        }
        assert_eq!(find_repeated(&tokens, 3, 3, 5), vec![]);
        for (i, b) in blocks.iter().enumerate() {
            assert!(word_count(b) >= 170, "block {i} has {} words", word_count(b));
        }
    }

    #[test]
    fn padding_pools_rotate_independently() {
        let anchors = vec!["ritmo".to_string()];
        let src = source(&anchors, "howto");
        let tables = RewriteTables::builtin();
        let intros = tables.blocks.intros.len();
        let a = topic_padding_paragraph(&src, 0).unwrap();
        let b = topic_padding_paragraph(&src, intros).unwrap();
        assert_ne!(a, b);
        assert!(b.contains(&tables.blocks.details[(2 * intros) % tables.blocks.details.len()]));
    }

    #[test]
    fn anchors_and_pack_are_appended() {
        let anchors = vec!["respiro".to_string()];
        let src = source(&anchors, "mistakes");
        let mut blocks: Vec<String> = (0..7).map(|i| format!("Testo del blocco {i}")).collect();
        blocks[1] = "Qui si parla di respiro.".to_string();
        assert_eq!(enforce_anchors(&mut blocks, &src), 6);
        assert!(blocks[0].starts_with("Testo del blocco 0. "));
        let cue = |b: &str| b.split(". ").nth(1).map(str::to_string);
        assert_ne!(cue(&blocks[0]), cue(&blocks[6]));
        assert_eq!(blocks[1], "Qui si parla di respiro.");
        assert_eq!(apply_type_pack(&mut blocks, &src), 3);
        assert!(blocks[2].contains("Errore 1 su respiro"));
        assert!(blocks[4].contains("Errore 3 su respiro"));
        assert!(!blocks[5].contains("Errore"));

        let mut plain: Vec<String> = vec!["a".to_string(); 7];
        assert_eq!(apply_type_pack(&mut plain, &source(&anchors, "story")), 0);
    }

    #[test]
    fn forbidden_terms_are_replaced_with_accents() {
        let anchors = vec!["ritmo".to_string()];
        let mut src = source(&anchors, "howto");
        src.audience = "over70";
        let mut blocks = vec![
            "Evita l'alta intensità e la Performance.".to_string(),
            "Niente record.".to_string(),
        ];
        let n = apply_audience_vocab(&mut blocks, &src);
        assert_eq!(n, 3);
        assert!(blocks[0].starts_with("Evita l'intensità moderata e la Stabilità."));
        assert!(blocks[0].contains("Voce over70"));
        assert_eq!(blocks[1], "Niente continuità.");
    }

    #[test]
    fn structured_blocks_meet_the_minimum() {
        let anchors = vec!["camminare".to_string(), "ritmo".to_string()];
        let src = source(&anchors, "howto");
        let raw: Vec<String> = (0..7)
            .map(|i| format!("[Parte {i}]: Frase breve numero {i} sul cammino."))
            .collect();
        let mut state = PadState::default();
        let (blocks, report) = structure_blocks(&raw, &src, &BlockParams::default(), &mut state);
        assert_eq!(blocks.len(), 7);
        assert!(blocks.iter().all(|b| word_count(b) >= 170));
        assert!(blocks.iter().all(|b| !b.contains("[Parte")));
        assert_eq!(report.pack_lines, 3);
        assert!(report.padding_paragraphs >= 7);
    }
}
