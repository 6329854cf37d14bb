//! Deterministic normalization of seven-segment Italian narrative scripts: structural block
//! repair, protected hook/CTA windows, trigram repetition control, a word-count budget,
//! open-loop cue spacing and quality scoring.

pub mod audit;
pub mod budget;
pub mod config;
pub mod cues;
pub mod document;
pub mod error;
pub mod model;
pub mod ngram;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod rewrite;
pub mod sanitize;
pub mod sentences;
pub mod tables;
pub mod textutil;
pub mod tokens;
pub mod zone;

pub use error::{ResidualFlag, ScriptError};
pub use pipeline::{generate_script, normalize_script, PipelineConfig, ScriptRequest, ScriptResponse};
pub use tables::RewriteTables;
