use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "script-forge.toml";
pub const CONFIG_ENV: &str = "SCRIPT_FORGE_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub normalize: NormalizeSection,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub cues: CuesSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub audit: AuditSection,
    #[serde(default)]
    pub tables: TablesSection,
    #[serde(default)]
    pub trace: TraceSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct NormalizeSection {
    #[serde(default)]
    pub segments: Option<usize>,
    #[serde(default)]
    pub block_min_words: Option<usize>,
    #[serde(default)]
    pub words_per_minute: Option<u32>,
    #[serde(default)]
    pub min_factor: Option<f64>,
    #[serde(default)]
    pub max_factor: Option<f64>,
    #[serde(default)]
    pub default_minutes: Option<u32>,
    #[serde(default)]
    pub min_minutes: Option<u32>,
    #[serde(default)]
    pub max_minutes: Option<u32>,

    /// Minimum protected windows; hook and CTA word counts extend them.
    #[serde(default)]
    pub protected_head_words: Option<usize>,
    #[serde(default)]
    pub protected_tail_words: Option<usize>,

    #[serde(default)]
    pub ngram_size: Option<usize>,
    #[serde(default)]
    pub trigram_threshold: Option<usize>,
    #[serde(default)]
    pub max_passes: Option<usize>,
    #[serde(default)]
    pub max_fixes: Option<usize>,
    #[serde(default)]
    pub final_passes: Option<usize>,

    #[serde(default)]
    pub layout: Option<bool>,
    #[serde(default)]
    pub sentences_per_paragraph: Option<usize>,
    #[serde(default)]
    pub channel_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DedupSection {
    #[serde(default)]
    pub jaccard: Option<f64>,
    #[serde(default)]
    pub max_len_diff: Option<usize>,
    #[serde(default)]
    pub min_tokens: Option<usize>,
    #[serde(default)]
    pub max_fixes: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CuesSection {
    #[serde(default)]
    pub max_gap_words: Option<usize>,
    #[serde(default)]
    pub max_insertions: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BudgetSection {
    #[serde(default)]
    pub pad_attempts: Option<usize>,
    #[serde(default)]
    pub outer_iterations: Option<usize>,
    #[serde(default)]
    pub block_pad_attempts: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AuditSection {
    /// "in_process" (default), "external" or "off".
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub trigram_threshold: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TablesSection {
    /// External rewrite tables; relative paths resolve against the config file directory.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TraceSection {
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
