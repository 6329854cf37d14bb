use serde::{Deserialize, Serialize};

use crate::audit::AuditOutcome;
use crate::error::ResidualFlag;
use crate::ngram::NgramCount;
use crate::quality::QualityReport;

/// A normalization request. Blocks come either already split (`rawGeneratedBlocks`) or as
/// the raw model reply (`modelOutput`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub topic: String,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default, rename = "type")]
    pub script_type: Option<String>,
    #[serde(default)]
    pub minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_generated_blocks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Counters and resolved inputs of one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptMeta {
    pub seed: u64,
    pub topic: String,
    pub audience: String,
    #[serde(rename = "type")]
    pub script_type: String,
    pub minutes: u32,
    pub anchors: Vec<String>,
    pub min_words: usize,
    pub max_words: usize,
    pub target_words: usize,
    pub in_range: bool,
    pub protected_head_words: usize,
    pub protected_tail_words: usize,
    pub layout_breaks: usize,
    pub banned_removed: usize,
    pub hotspot_caps: usize,
    pub fixes_applied: usize,
    pub pads_added: usize,
    pub words_trimmed: usize,
    pub duplicate_rewrites: usize,
    pub cue_insertions: usize,
    pub anchor_cues: usize,
    pub pack_lines: usize,
    pub vocab_replacements: usize,
    pub top_repeated_trigrams: Vec<NgramCount>,
    pub input_fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResponse {
    pub final_script: String,
    pub word_count: usize,
    pub block_word_counts: Vec<usize>,
    pub quality_report: QualityReport,
    pub residual_flags: Vec<ResidualFlag>,
    pub audit: AuditOutcome,
    pub meta: ScriptMeta,
}

impl ScriptResponse {
    /// Residual flags or a non-passing audit.
    #[must_use]
    pub fn has_warning(&self) -> bool {
        !self.residual_flags.is_empty() || (self.audit.ran && !self.audit.passed())
    }
}

#[cfg(test)]
mod tests {
    use super::ScriptRequest;

    #[test]
    fn request_reads_camel_case_and_type() {
        let json = r#"{
            "topic": "camminare dopo i 60",
            "audience": "over60",
            "type": "mistakes",
            "minutes": 9,
            "rawGeneratedBlocks": ["uno", "due"]
        }"#;
        let req: ScriptRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.script_type.as_deref(), Some("mistakes"));
        assert_eq!(req.raw_generated_blocks.as_ref().map(Vec::len), Some(2));
        assert!(req.model_output.is_none());
        assert!(req.seed.is_none());
    }
}
