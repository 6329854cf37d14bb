use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::audit::{AuditParams, ExternalAudit};
use crate::budget::BudgetParams;
use crate::config::{find_default_config, load_config, AppConfig, CONFIG_ENV, CONFIG_FILENAME};
use crate::cues::CueParams;
use crate::ngram::NgramParams;
use crate::rewrite::RepetitionParams;
use crate::sentences::DuplicateParams;
use crate::tables::{RewriteTables, BUILTIN_TABLES_TOML};

use super::blocks::{normalize_audience, BlockParams};

pub const TABLES_FILENAME: &str = "rewrite-tables.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditMode {
    InProcess,
    External,
    Off,
}

impl AuditMode {
    pub fn parse(s: Option<&str>) -> Self {
        match s.unwrap_or("in_process").trim().to_ascii_lowercase().as_str() {
            "external" => Self::External,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::InProcess,
        }
    }
}

/// Every knob of a normalization run, resolved from the config file and defaults.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: Option<PathBuf>,

    pub segments: usize,
    pub block_min_words: usize,
    pub words_per_minute: u32,
    pub min_factor: f64,
    pub max_factor: f64,
    pub default_minutes: u32,
    pub min_minutes: u32,
    pub max_minutes: u32,
    pub protected_head_words: usize,
    pub protected_tail_words: usize,

    pub repetition: RepetitionParams,
    pub final_passes: usize,
    pub layout: bool,
    pub sentences_per_paragraph: usize,
    pub channel_name: String,

    pub dedup: DuplicateParams,
    pub dedup_max_fixes: usize,
    pub cues: CueParams,

    pub pad_attempts: usize,
    pub outer_iterations: usize,
    pub block_pad_attempts: usize,

    pub audit_mode: AuditMode,
    pub audit_command: Option<String>,
    pub audit_args: Vec<String>,
    pub audit_timeout: Duration,
    pub audit_trigram_threshold: usize,

    pub trace_dir: Option<PathBuf>,

    pub tables: Arc<RewriteTables>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default(), None, Arc::new(RewriteTables::builtin().clone()))
    }
}

impl PipelineConfig {
    /// Config file precedence: `explicit` > `SCRIPT_FORGE_CONFIG` > `script-forge.toml`
    /// found upwards from the working directory. No file means built-in defaults.
    pub fn resolve(workdir: &Path, explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        let cfg_file = explicit
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(workdir, CONFIG_FILENAME));

        let (file_cfg, cfg_path) = match cfg_file {
            Some(p) if p.exists() => (load_config(&p)?, Some(p)),
            Some(p) => {
                log::warn!("config file not found: {}, using defaults", p.display());
                (AppConfig::default(), None)
            }
            None => (AppConfig::default(), None),
        };

        let config_dir = cfg_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workdir.to_path_buf());

        let tables = match file_cfg
            .tables
            .path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(rel) => {
                let path = relative_to(&config_dir, rel);
                RewriteTables::from_toml_path(&path)
                    .with_context(|| format!("load rewrite tables: {}", path.display()))?
            }
            None => RewriteTables::builtin().clone(),
        };

        let mut cfg = Self::from_app_config(&file_cfg, cfg_path, Arc::new(tables));
        cfg.trace_dir = cfg.trace_dir.map(|d| {
            if d.is_relative() {
                config_dir.join(d)
            } else {
                d
            }
        });
        Ok(cfg)
    }

    pub fn from_app_config(
        file_cfg: &AppConfig,
        config_path: Option<PathBuf>,
        tables: Arc<RewriteTables>,
    ) -> Self {
        let n = &file_cfg.normalize;
        let min_minutes = n.min_minutes.unwrap_or(7).max(1);
        let max_minutes = n.max_minutes.unwrap_or(12).max(min_minutes);
        let default_minutes = n.default_minutes.unwrap_or(9).clamp(min_minutes, max_minutes);
        let ngram = NgramParams {
            size: n.ngram_size.unwrap_or(3).max(1),
            threshold: n.trigram_threshold.unwrap_or(3).max(2),
        };

        let d = &file_cfg.dedup;
        let defaults = DuplicateParams::default();
        let dedup = DuplicateParams {
            jaccard: d.jaccard.unwrap_or(defaults.jaccard),
            max_len_diff: d.max_len_diff.unwrap_or(defaults.max_len_diff),
            min_tokens: d.min_tokens.unwrap_or(defaults.min_tokens),
        };

        let c = &file_cfg.cues;
        let cues = CueParams {
            max_gap_words: c.max_gap_words.unwrap_or(225),
            max_insertions: c.max_insertions.unwrap_or(2),
        };

        let a = &file_cfg.audit;
        let trace_enabled = file_cfg.trace.enabled.unwrap_or(file_cfg.trace.dir.is_some());
        let trace_dir = file_cfg
            .trace
            .dir
            .as_deref()
            .map(str::trim)
            .filter(|s| trace_enabled && !s.is_empty())
            .map(PathBuf::from);

        Self {
            config_path,
            segments: n.segments.unwrap_or(7).max(1),
            block_min_words: n.block_min_words.unwrap_or(170),
            words_per_minute: n.words_per_minute.unwrap_or(150).max(1),
            min_factor: n.min_factor.unwrap_or(0.85),
            max_factor: n.max_factor.unwrap_or(1.15),
            default_minutes,
            min_minutes,
            max_minutes,
            protected_head_words: n.protected_head_words.unwrap_or(200),
            protected_tail_words: n.protected_tail_words.unwrap_or(120),
            repetition: RepetitionParams {
                ngram,
                max_passes: n.max_passes.unwrap_or(4),
                max_fixes: n.max_fixes.unwrap_or(12),
            },
            final_passes: n.final_passes.unwrap_or(2),
            layout: n.layout.unwrap_or(true),
            sentences_per_paragraph: n.sentences_per_paragraph.unwrap_or(2),
            channel_name: n
                .channel_name
                .clone()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Script Forge".to_string()),
            dedup,
            dedup_max_fixes: d.max_fixes.unwrap_or(24),
            cues,
            pad_attempts: file_cfg.budget.pad_attempts.unwrap_or(260),
            outer_iterations: file_cfg.budget.outer_iterations.unwrap_or(3),
            block_pad_attempts: file_cfg.budget.block_pad_attempts.unwrap_or(40),
            audit_mode: AuditMode::parse(a.mode.as_deref()),
            audit_command: a
                .command
                .clone()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            audit_args: a.args.clone().unwrap_or_default(),
            audit_timeout: Duration::from_secs(a.timeout_secs.unwrap_or(60).max(1)),
            audit_trigram_threshold: a.trigram_threshold.unwrap_or(3),
            trace_dir,
            tables,
        }
    }

    #[must_use]
    pub fn budget_params(&self) -> BudgetParams {
        BudgetParams {
            pad_attempts: self.pad_attempts,
            ngram: self.repetition.ngram,
        }
    }

    #[must_use]
    pub fn block_params(&self) -> BlockParams {
        BlockParams {
            segments: self.segments,
            min_words: self.block_min_words,
            attempts: self.block_pad_attempts,
            ngram: self.repetition.ngram,
        }
    }

    /// Audit inputs for a raw audience and duration, normalized the way a run normalizes
    /// them.
    #[must_use]
    pub fn audit_params(&self, audience: &str, minutes: Option<u32>) -> AuditParams {
        AuditParams {
            audience: normalize_audience(audience, &self.tables),
            minutes: Some(self.clamp_minutes(minutes)),
            trigram_threshold: self.audit_trigram_threshold,
        }
    }

    /// The subprocess runner, when `[audit] mode = "external"` names a command.
    #[must_use]
    pub fn external_audit(&self) -> Option<ExternalAudit> {
        if self.audit_mode != AuditMode::External {
            return None;
        }
        let command = self.audit_command.clone()?;
        Some(ExternalAudit {
            command,
            args: self.audit_args.clone(),
            timeout: self.audit_timeout,
        })
    }

    /// Minutes clamped to the configured range; missing or zero means the default.
    #[must_use]
    pub fn clamp_minutes(&self, minutes: Option<u32>) -> u32 {
        match minutes {
            Some(m) if m > 0 => m.clamp(self.min_minutes, self.max_minutes),
            _ => self.default_minutes,
        }
    }
}

fn relative_to(dir: &Path, path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_relative() {
        dir.join(p)
    } else {
        p
    }
}

/// Writes `script-forge.toml` and `rewrite-tables.toml` into `dir`. Existing files are
/// kept unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;

    let tables_path = dir.join(TABLES_FILENAME);
    if !tables_path.exists() || force {
        std::fs::write(&tables_path, BUILTIN_TABLES_TOML)
            .with_context(|| format!("write rewrite tables: {}", tables_path.display()))?;
    }

    let cfg_path = dir.join(CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[normalize]
segments = 7
block_min_words = 170
words_per_minute = 150
min_factor = 0.85
max_factor = 1.15
default_minutes = 9
min_minutes = 7
max_minutes = 12

# Hook and CTA word counts extend these windows when longer.
protected_head_words = 200
protected_tail_words = 120

ngram_size = 3
trigram_threshold = 3
max_passes = 4
max_fixes = 12
final_passes = 2

layout = true
sentences_per_paragraph = 2
# channel_name = "Il mio canale"

[dedup]
jaccard = 0.86
max_len_diff = 4
min_tokens = 4
max_fixes = 24

[cues]
max_gap_words = 225
max_insertions = 2

[budget]
pad_attempts = 260
outer_iterations = 3
block_pad_attempts = 40

[audit]
# "in_process", "external" or "off"
mode = "in_process"
# command = "node"
# args = ["tools/scriptQualityCheck.js"]
timeout_secs = 60
trigram_threshold = 3

[tables]
path = "rewrite-tables.toml"

[trace]
# dir = "_trace"
enabled = false
"#;

#[cfg(test)]
mod tests {
    use super::{init_default_config, AuditMode, PipelineConfig};

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.segments, 7);
        assert_eq!(cfg.block_min_words, 170);
        assert_eq!((cfg.min_minutes, cfg.default_minutes, cfg.max_minutes), (7, 9, 12));
        assert_eq!(cfg.repetition.ngram.threshold, 3);
        assert_eq!(cfg.dedup_max_fixes, 24);
        assert_eq!(cfg.audit_mode, AuditMode::InProcess);
        assert!(cfg.external_audit().is_none());
        assert!(cfg.trace_dir.is_none());
    }

    #[test]
    fn minutes_are_clamped() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.clamp_minutes(None), 9);
        assert_eq!(cfg.clamp_minutes(Some(0)), 9);
        assert_eq!(cfg.clamp_minutes(Some(3)), 7);
        assert_eq!(cfg.clamp_minutes(Some(30)), 12);
        assert_eq!(cfg.clamp_minutes(Some(10)), 10);
    }

    #[test]
    fn audit_params_normalize_like_a_run() {
        let cfg = PipelineConfig::default();
        let p = cfg.audit_params("Over 70", Some(30));
        assert_eq!(p.audience, "over70");
        assert_eq!(p.minutes, Some(12));
        assert_eq!(p.trigram_threshold, 3);
        assert_eq!(cfg.audit_params("", Some(2)).minutes, Some(7));
        assert_eq!(cfg.audit_params("teens", None).minutes, Some(9));
        assert_eq!(cfg.audit_params("teens", None).audience, "over60");
    }

    #[test]
    fn init_writes_loadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_default_config(dir.path(), false).unwrap();
        assert!(dir.path().join("rewrite-tables.toml").exists());

        let cfg = PipelineConfig::resolve(dir.path(), Some(path.clone())).unwrap();
        assert_eq!(cfg.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(cfg.tables.version, 1);
        assert_eq!(cfg.pad_attempts, 260);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[normalize]\nblock_min_words = 120\n\n[audit]\nmode = \"external\"\ncommand = \"node\"\nargs = [\"check.js\"]\n\n[trace]\ndir = \"_trace\"\n",
        )
        .unwrap();
        let cfg = PipelineConfig::resolve(dir.path(), Some(path)).unwrap();
        assert_eq!(cfg.block_min_words, 120);
        let ext = cfg.external_audit().unwrap();
        assert_eq!(ext.command, "node");
        assert_eq!(ext.args, vec!["check.js".to_string()]);
        assert_eq!(cfg.trace_dir, Some(dir.path().join("_trace")));
    }

    #[test]
    fn missing_tables_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script-forge.toml");
        std::fs::write(&path, "[tables]\npath = \"nope.toml\"\n").unwrap();
        let err = PipelineConfig::resolve(dir.path(), Some(path)).unwrap_err();
        assert!(format!("{err:#}").contains("nope.toml"));
    }
}
