use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced to the caller. Everything else inside normalization is repaired or
/// reported as a [`ResidualFlag`].
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("model call failed ({provider}, status {status:?}): {message}")]
    ModelCall {
        provider: String,
        status: Option<u16>,
        message: String,
    },
    #[error("model output does not respect the block format: {0}")]
    FormatNotRespected(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("audit tool unavailable: {reason}")]
    AuditToolUnavailable { reason: String },
    #[error("audit tool timed out after {secs}s")]
    AuditToolTimeout { secs: u64 },
}

impl ScriptError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::FormatNotRespected(reason.into())
    }

    pub(crate) fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self::AuditToolUnavailable {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelCall { .. } => "MODEL_CALL_ERROR",
            Self::FormatNotRespected(_) => "FORMAT_NOT_RESPECTED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::AuditToolUnavailable { .. } => "AUDIT_TOOL_UNAVAILABLE",
            Self::AuditToolTimeout { .. } => "AUDIT_TOOL_TIMEOUT",
        }
    }
}

/// Soft constraint violations left in the final script.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResidualFlag {
    UnderMinWords,
    OverMaxWords,
    TrigramGeThreshold,
    BlockUnderMinWords,
    CueGapTooWide,
    DuplicateSentences,
}

impl ResidualFlag {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::UnderMinWords => "UNDER_MIN_WORDS",
            Self::OverMaxWords => "OVER_MAX_WORDS",
            Self::TrigramGeThreshold => "TRIGRAM_GE_THRESHOLD",
            Self::BlockUnderMinWords => "BLOCK_UNDER_MIN_WORDS",
            Self::CueGapTooWide => "CUE_GAP_TOO_WIDE",
            Self::DuplicateSentences => "DUPLICATE_SENTENCES",
        }
    }
}
