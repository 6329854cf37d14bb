mod api;
mod blocks;
mod config;
mod context;
mod orchestrator;
mod prompts;
mod trace;

pub use api::{ScriptMeta, ScriptRequest, ScriptResponse};
pub use blocks::{
    apply_audience_vocab, apply_type_pack, enforce_anchors, ensure_block_min_words, extract_anchors,
    normalize_audience, normalize_type, parse_model_blocks, stitch_blocks, structure_blocks,
    topic_padding_paragraph, BlockParams, BlockSource, StructureReport,
};
pub use config::{init_default_config, AuditMode, PipelineConfig, TABLES_FILENAME};
pub use context::{derive_seed, input_fingerprint, RunContext};
pub use orchestrator::{generate_script, normalize_script, ScriptPipeline};
pub use prompts::{golden_prompt, render_template, PromptInputs, GOLDEN_PROMPT_TEXT, GOLDEN_SYSTEM_TEXT};
pub use trace::TraceWriter;
