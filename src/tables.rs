use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::Path;

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::textutil::clean_for_match;

pub const BUILTIN_TABLES_TOML: &str = include_str!("../data/rewrite-tables.toml");

static BUILTIN: Lazy<RewriteTables> = Lazy::new(|| {
    toml::from_str(BUILTIN_TABLES_TOML).expect("builtin rewrite tables")
});

/// A regex compiled while the tables are deserialized.
#[derive(Clone, Debug)]
pub struct Pattern(Regex);

impl Deref for Pattern {
    type Target = Regex;

    fn deref(&self) -> &Regex {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Regex::new(&s).map(Pattern).map_err(serde::de::Error::custom)
    }
}

/// Versioned, data-driven rewrite material. Phrase keys are in the folded
/// lowercase form produced by [`crate::textutil::normalize_word`].
#[derive(Clone, Debug, Deserialize)]
pub struct RewriteTables {
    pub version: u32,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub banned_sentences: Vec<String>,
    #[serde(default)]
    pub phrases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub fragments: Vec<FragmentRule>,
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub sentence: SentenceTables,
    #[serde(default)]
    pub duplicates: DuplicateTables,
    #[serde(default)]
    pub cues: CueTables,
    #[serde(default)]
    pub pad: PadTables,
    #[serde(default)]
    pub blocks: BlockTables,
    #[serde(default)]
    pub anchors: AnchorTables,
    #[serde(default)]
    pub quality: QualityTables,
    #[serde(default)]
    pub hotspots: Vec<HotspotRule>,
    #[serde(default)]
    pub audiences: BTreeMap<String, AudienceProfile>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeProfile>,
    #[serde(default)]
    pub script: ScriptTables,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FragmentRule {
    pub fragment: String,
    pub variants: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct SentenceTables {
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub fillers: Vec<String>,
    #[serde(default)]
    pub bridge_pattern: Option<Pattern>,
    #[serde(default)]
    pub direct_templates: Vec<String>,
    #[serde(default)]
    pub fallback_templates: Vec<String>,
    #[serde(default)]
    pub infinitives: BTreeMap<String, String>,
    #[serde(default)]
    pub inversion_pattern: Option<Pattern>,
    #[serde(default)]
    pub inversion_template: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DuplicateTables {
    #[serde(default)]
    pub question_opener: Option<Pattern>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub leads: Vec<LeadRule>,
    #[serde(default)]
    pub swaps: Vec<SwapRule>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LeadRule {
    pub pattern: Pattern,
    pub options: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SwapRule {
    pub word: String,
    pub options: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CueTables {
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub legacy: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub payoffs: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PadTables {
    #[serde(default)]
    pub skip_phrases: Vec<String>,
    #[serde(default)]
    pub openers: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub voices: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub frames: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BlockTables {
    #[serde(default)]
    pub golden: Vec<String>,
    #[serde(default)]
    pub intros: Vec<String>,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub anchor_cues: Vec<String>,
    #[serde(default)]
    pub variants: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AnchorTables {
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default)]
    pub fallback: Vec<String>,
    #[serde(default)]
    pub topic_aliases: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QualityTables {
    #[serde(default)]
    pub lazy_phrases: Vec<String>,
    #[serde(default)]
    pub banned_openers: Vec<String>,
    #[serde(default)]
    pub problem_keywords: Vec<String>,
    #[serde(default)]
    pub promise_pattern: Option<Pattern>,
    #[serde(default)]
    pub benefit_keywords: Vec<String>,
    #[serde(default)]
    pub micro_markers: Vec<String>,
    #[serde(default)]
    pub placeholders: Vec<String>,
    #[serde(default)]
    pub technical_terms: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HotspotRule {
    pub phrase: String,
    pub keep: usize,
    pub variants: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AudienceProfile {
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub mandatory: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<String>,
    #[serde(default)]
    pub voice_line: Option<String>,
    #[serde(default)]
    pub padding_voices: Vec<String>,
    #[serde(default)]
    pub fallback_replacement: Option<String>,
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
    #[serde(default)]
    pub audit: AudienceAudit,
}

/// Compliance rules the audit applies for one audience.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct AudienceAudit {
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub min_groups: usize,
    #[serde(default)]
    pub max_technical: Option<usize>,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub max_avg_sentence_words: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TypeProfile {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub pack: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ScriptTables {
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub cta: Vec<String>,
    #[serde(default)]
    pub banned_prompt_phrases: Vec<String>,
}

impl RewriteTables {
    #[must_use]
    pub fn builtin() -> &'static RewriteTables {
        &BUILTIN
    }

    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read rewrite tables: {}", path.display()))?;
        let s = String::from_utf8(bytes).context("rewrite tables must be utf-8")?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let tables: RewriteTables = toml::from_str(s).context("parse rewrite tables (toml)")?;
        if tables.version != 1 {
            return Err(anyhow!(
                "unsupported rewrite tables version: {} (expected 1)",
                tables.version
            ));
        }
        Ok(tables)
    }

    /// Padding voices for an audience, falling back to the `default` pool.
    #[must_use]
    pub fn pad_voices(&self, audience: &str) -> &[String] {
        keyed_or_default(&self.pad.voices, audience)
    }

    #[must_use]
    pub fn pad_frames(&self, script_type: &str) -> &[String] {
        keyed_or_default(&self.pad.frames, script_type)
    }

    #[must_use]
    pub fn block_variants(&self, script_type: &str) -> &[String] {
        keyed_or_default(&self.blocks.variants, script_type)
    }

    #[must_use]
    pub fn audience(&self, audience: &str) -> Option<&AudienceProfile> {
        self.audiences.get(audience)
    }

    #[must_use]
    pub fn phrase_variants(&self, key: &str) -> Option<&[String]> {
        self.phrases.get(key).map(Vec::as_slice)
    }

    /// Normalized banned sentence bodies (terminal punctuation dropped).
    #[must_use]
    pub fn banned_sentence_keys(&self) -> Vec<String> {
        self.banned_sentences
            .iter()
            .map(|s| clean_for_match(s))
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn keyed_or_default<'a>(map: &'a BTreeMap<String, Vec<String>>, key: &str) -> &'a [String] {
    map.get(key)
        .filter(|v| !v.is_empty())
        .or_else(|| map.get("default"))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Picks `items[index % len]`, or `None` for an empty pool.
#[must_use]
pub fn rotate<T>(items: &[T], index: usize) -> Option<&T> {
    if items.is_empty() {
        None
    } else {
        items.get(index % items.len())
    }
}
