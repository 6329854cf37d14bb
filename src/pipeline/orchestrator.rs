use std::collections::BTreeSet;

use crate::audit::{audit_script, AuditOutcome};
use crate::budget::{enforce_range, pad_blocks_to_min, BudgetOutcome, LengthBudget, PadSource};
use crate::cues::{cue_gaps, locate_cues, space_cues};
use crate::document::Document;
use crate::error::{ResidualFlag, ScriptError};
use crate::model::{FallbackModel, ModelRequest, TextModel};
use crate::ngram::find_repeated;
use crate::progress::ConsoleProgress;
use crate::quality::score_script;
use crate::rewrite::{
    cap_hotspots, dedupe_sentences, reduce_repetition, remove_banned_sentences, script_hotspots,
};
use crate::sanitize::layout_paragraphs;
use crate::sentences::{find_duplicates, segment};
use crate::tables::{rotate, RewriteTables};
use crate::textutil::{fill_slots, word_count};
use crate::zone::ProtectedZone;

use super::api::{ScriptMeta, ScriptRequest, ScriptResponse};
use super::blocks::{
    extract_anchors, normalize_audience, normalize_type, parse_model_blocks, seeded, structure_blocks,
    BlockSource,
};
use super::config::{AuditMode, PipelineConfig};
use super::context::{derive_seed, input_fingerprint, RunContext};
use super::prompts::{golden_prompt, PromptInputs, GOLDEN_SYSTEM_TEXT};
use super::trace::TraceWriter;

const STAGES: usize = 12;

/// A request with every field resolved.
#[derive(Clone, Debug)]
struct Resolved {
    topic: String,
    audience: String,
    script_type: String,
    minutes: u32,
    seed: u64,
    anchors: Vec<String>,
    budget: LengthBudget,
}

/// Model reply bookkeeping carried into the response meta.
#[derive(Clone, Debug, Default)]
struct ModelMeta {
    provider_used: Option<String>,
    fallback_used: bool,
    last_error: Option<String>,
}

pub struct ScriptPipeline<'a> {
    cfg: &'a PipelineConfig,
    progress: &'a ConsoleProgress,
    trace: TraceWriter,
}

impl<'a> ScriptPipeline<'a> {
    pub fn new(cfg: &'a PipelineConfig, progress: &'a ConsoleProgress) -> Self {
        let trace = match cfg.trace_dir.clone() {
            Some(dir) => TraceWriter::new(dir, true).unwrap_or_else(|e| {
                log::warn!("trace disabled: {e:#}");
                TraceWriter::disabled()
            }),
            None => TraceWriter::disabled(),
        };
        Self {
            cfg,
            progress,
            trace,
        }
    }

    fn tables(&self) -> &RewriteTables {
        &self.cfg.tables
    }

    fn resolve(&self, request: &ScriptRequest) -> Result<Resolved, ScriptError> {
        let topic = request.topic.trim().to_string();
        if topic.is_empty() {
            return Err(ScriptError::InvalidRequest("missing topic".to_string()));
        }
        let audience = normalize_audience(request.audience.as_deref().unwrap_or(""), self.tables());
        let script_type = normalize_type(request.script_type.as_deref().unwrap_or(""));
        let minutes = self.cfg.clamp_minutes(request.minutes);
        let seed = request
            .seed
            .unwrap_or_else(|| derive_seed(&topic, &audience, &script_type));
        let anchors = extract_anchors(&topic, self.tables());
        let budget = LengthBudget::from_minutes(
            minutes,
            self.cfg.words_per_minute,
            self.cfg.min_factor,
            self.cfg.max_factor,
        );
        Ok(Resolved {
            topic,
            audience,
            script_type,
            minutes,
            seed,
            anchors,
            budget,
        })
    }

    /// The generation prompt for `request`.
    pub fn prompt(&self, request: &ScriptRequest) -> Result<String, ScriptError> {
        let r = self.resolve(request)?;
        Ok(golden_prompt(
            self.tables(),
            &PromptInputs {
                topic: &r.topic,
                audience: &r.audience,
                script_type: &r.script_type,
                minutes: r.minutes,
                min_words: r.budget.min_words,
                max_words: r.budget.max_words,
                segments: self.cfg.segments,
                block_min_words: self.cfg.block_min_words,
                anchors: &r.anchors,
            },
        ))
    }

    /// Normalizes the blocks carried by `request`.
    pub fn run(&self, request: &ScriptRequest) -> Result<ScriptResponse, ScriptError> {
        let resolved = self.resolve(request)?;
        let raw = match (&request.raw_generated_blocks, &request.model_output) {
            (Some(blocks), _) if blocks.is_empty() => return Err(ScriptError::format("blocks_empty")),
            (Some(blocks), _) => blocks.clone(),
            (None, Some(text)) => parse_model_blocks(text)?,
            (None, None) => {
                return Err(ScriptError::InvalidRequest(
                    "provide rawGeneratedBlocks or modelOutput".to_string(),
                ))
            }
        };
        Ok(self.normalize(&resolved, &raw, ModelMeta::default()))
    }

    /// Renders the prompt, calls `model`, parses its blocks and normalizes them.
    pub fn generate(
        &self,
        model: &mut dyn TextModel,
        request: &ScriptRequest,
    ) -> Result<ScriptResponse, ScriptError> {
        let resolved = self.resolve(request)?;
        let prompt = self.prompt(request)?;
        self.progress.info(format!("Generate: {}", model.provider()));
        let req = ModelRequest::json(Some(GOLDEN_SYSTEM_TEXT.to_string()), prompt);
        let text = model.generate(&req)?;
        self.trace_text("model_output.txt", &text);
        let raw = parse_model_blocks(&text)?;
        let meta = ModelMeta {
            provider_used: Some(model.provider().to_string()),
            ..ModelMeta::default()
        };
        Ok(self.normalize(&resolved, &raw, meta))
    }

    /// Like [`Self::generate`], reporting which provider answered.
    pub fn generate_with_fallback(
        &self,
        model: &mut FallbackModel,
        request: &ScriptRequest,
    ) -> Result<ScriptResponse, ScriptError> {
        let resolved = self.resolve(request)?;
        let prompt = self.prompt(request)?;
        let req = ModelRequest::json(Some(GOLDEN_SYSTEM_TEXT.to_string()), prompt);
        let reply = model.generate_with_meta(&req)?;
        self.trace_text("model_output.txt", &reply.text);
        let raw = parse_model_blocks(&reply.text)?;
        let meta = ModelMeta {
            provider_used: Some(reply.provider_used),
            fallback_used: reply.fallback_used,
            last_error: reply.last_error,
        };
        Ok(self.normalize(&resolved, &raw, meta))
    }

    fn trace_text(&self, name: &str, text: &str) {
        if let Err(e) = self.trace.write_named_text(name, text) {
            log::warn!("trace write failed: {e:#}");
        }
    }

    fn stage(&self, index: usize, name: &str, doc: &Document, edits: usize) {
        self.progress
            .stage(index, STAGES, name, doc.word_count(), edits);
        log::debug!("stage {name}: {} words, {edits} edits", doc.word_count());
        if let Err(e) = self.trace.write_stage(index, name, doc.text()) {
            log::warn!("trace write failed: {e:#}");
        }
    }

    fn hook_and_cta(&self, r: &Resolved) -> (String, String) {
        let tables = self.tables();
        let vars = [("topic", r.topic.as_str()), ("channel", self.cfg.channel_name.as_str())];
        let hook = rotate(&tables.script.hooks, seeded(r.seed, 0, tables.script.hooks.len()))
            .map(|h| fill_slots(h, &vars))
            .unwrap_or_default();
        let cta = tables
            .script
            .cta
            .iter()
            .map(|line| fill_slots(line, &vars))
            .collect::<Vec<_>>()
            .join("\n\n");
        (hook, cta)
    }

    fn normalize(&self, r: &Resolved, raw: &[String], model: ModelMeta) -> ScriptResponse {
        let cfg = self.cfg;
        let tables = self.tables();
        let ngram = cfg.repetition.ngram;
        let mut ctx = RunContext::new(r.seed);
        let mut meta = ScriptMeta {
            seed: r.seed,
            topic: r.topic.clone(),
            audience: r.audience.clone(),
            script_type: r.script_type.clone(),
            minutes: r.minutes,
            anchors: r.anchors.clone(),
            min_words: r.budget.min_words,
            max_words: r.budget.max_words,
            target_words: r.budget.target_words,
            input_fingerprint: input_fingerprint(raw),
            provider_used: model.provider_used,
            fallback_used: model.fallback_used,
            last_error: model.last_error,
            ..ScriptMeta::default()
        };
        self.progress.info(format!(
            "Normalize: {} / {} / {} ({} min, {}-{} words)",
            r.topic, r.audience, r.script_type, r.minutes, r.budget.min_words, r.budget.max_words
        ));

        // Blocks
        let src = BlockSource {
            tables,
            topic: &r.topic,
            audience: &r.audience,
            script_type: &r.script_type,
            anchors: &r.anchors,
            seed: r.seed,
        };
        let (blocks, structured) = structure_blocks(raw, &src, &cfg.block_params(), &mut ctx.block_pads);
        meta.anchor_cues = structured.anchor_cues;
        meta.pack_lines = structured.pack_lines;
        meta.vocab_replacements = structured.vocab_replacements;

        let (hook, cta) = self.hook_and_cta(r);
        let mut doc = Document::assemble(&hook, &blocks, &cta);
        let zone = ProtectedZone::new(
            cfg.protected_head_words.max(word_count(&hook)),
            cfg.protected_tail_words.max(word_count(&cta)),
        );
        meta.protected_head_words = zone.head_words;
        meta.protected_tail_words = zone.tail_words;
        self.stage(1, "assemble", &doc, 0);

        if cfg.layout {
            meta.layout_breaks = layout_paragraphs(&mut doc, &zone, cfg.sentences_per_paragraph);
        }
        self.stage(2, "layout", &doc, meta.layout_breaks);

        meta.banned_removed = remove_banned_sentences(&mut doc, &zone, tables);
        self.stage(3, "banned", &doc, meta.banned_removed);

        meta.hotspot_caps = cap_hotspots(&mut doc, &zone, &script_hotspots(tables, &r.topic), ngram).len();
        self.stage(4, "hotspots", &doc, meta.hotspot_caps);

        let fixes = reduce_repetition(&mut doc, &zone, tables, &cfg.repetition).len();
        meta.fixes_applied += fixes;
        self.stage(5, "reduce", &doc, fixes);

        // Length budget
        let pad_src = PadSource {
            tables,
            anchors: &r.anchors,
            audience: &r.audience,
            script_type: &r.script_type,
        };
        let budget_params = cfg.budget_params();
        let mut budget_edits = 0usize;
        for _ in 0..cfg.outer_iterations.max(1) {
            let (state, outcome) =
                enforce_range(&mut doc, &zone, &r.budget, &pad_src, &mut ctx.pads, &budget_params);
            budget_edits += record_budget(&mut meta, &outcome);
            let fixes = reduce_repetition(&mut doc, &zone, tables, &cfg.repetition).len();
            meta.fixes_applied += fixes;
            log::debug!("budget {state:?}: {} words", doc.word_count());
            if r.budget.contains(doc.word_count()) && fixes == 0 {
                break;
            }
        }
        self.stage(6, "budget", &doc, budget_edits);

        let dups = dedupe_sentences(
            &mut doc,
            &zone,
            tables,
            &cfg.dedup,
            ngram,
            cfg.dedup_max_fixes,
            &mut ctx.variant,
        )
        .len();
        meta.duplicate_rewrites = dups;
        self.stage(7, "dedupe", &doc, dups);

        meta.cue_insertions = space_cues(&mut doc, &zone, tables, &cfg.cues, ngram, r.seed);
        self.stage(8, "cues", &doc, meta.cue_insertions);

        let mut final_fixes = 0usize;
        for _ in 0..cfg.final_passes {
            let n = reduce_repetition(&mut doc, &zone, tables, &cfg.repetition).len();
            final_fixes += n;
            if n == 0 {
                break;
            }
        }
        meta.fixes_applied += final_fixes;
        self.stage(9, "guarantee", &doc, final_fixes);

        let mut range_edits = 0usize;
        if !r.budget.contains(doc.word_count()) {
            let (_, outcome) =
                enforce_range(&mut doc, &zone, &r.budget, &pad_src, &mut ctx.pads, &budget_params);
            range_edits += record_budget(&mut meta, &outcome);
        }
        if doc
            .block_word_counts()
            .iter()
            .any(|&n| n < cfg.block_min_words)
        {
            let outcome = pad_blocks_to_min(
                &mut doc,
                &zone,
                &r.budget,
                cfg.block_min_words,
                &pad_src,
                &mut ctx.pads,
                &budget_params,
            );
            meta.pads_added += outcome.pads_added;
            range_edits += outcome.pads_added;
        }
        self.stage(10, "range", &doc, range_edits);

        let text = doc.text().to_string();
        let words = doc.word_count();
        meta.in_range = r.budget.contains(words);
        let block_word_counts = doc.block_word_counts();
        let tokens = doc.tokens();
        meta.top_repeated_trigrams = find_repeated(&tokens, ngram.size, ngram.threshold, 10);

        let residual_flags = self.residual_flags(&doc, r, &block_word_counts, !meta.top_repeated_trigrams.is_empty());
        let quality_report = score_script(&text, tables);
        self.stage(11, "score", &doc, 0);

        let audit = self.audit(&text, r);
        self.stage(12, "audit", &doc, 0);

        let response = ScriptResponse {
            final_script: text,
            word_count: words,
            block_word_counts,
            quality_report,
            residual_flags,
            audit,
            meta,
        };
        if let Err(e) = self.trace.write_json("response.json", &response) {
            log::warn!("trace write failed: {e:#}");
        }
        self.progress.info(format!(
            "Done: {} words, score {}, flags [{}]",
            response.word_count,
            response.quality_report.score,
            response
                .residual_flags
                .iter()
                .map(|f| f.label())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        response
    }

    fn residual_flags(
        &self,
        doc: &Document,
        r: &Resolved,
        block_word_counts: &[usize],
        repeated: bool,
    ) -> Vec<ResidualFlag> {
        let mut flags = BTreeSet::new();
        let words = doc.word_count();
        if words < r.budget.min_words {
            flags.insert(ResidualFlag::UnderMinWords);
        }
        if words > r.budget.max_words {
            flags.insert(ResidualFlag::OverMaxWords);
        }
        if repeated {
            flags.insert(ResidualFlag::TrigramGeThreshold);
        }
        if block_word_counts.len() < self.cfg.segments
            || block_word_counts.iter().any(|&n| n < self.cfg.block_min_words)
        {
            flags.insert(ResidualFlag::BlockUnderMinWords);
        }
        let tokens = doc.tokens();
        let cues = locate_cues(&tokens, &self.tables().cues.phrases);
        if cue_gaps(&cues)
            .iter()
            .any(|g| g.words > self.cfg.cues.max_gap_words)
        {
            flags.insert(ResidualFlag::CueGapTooWide);
        }
        let window = ProtectedZone::none().window(doc.text(), &tokens);
        let sentences = segment(doc.text(), &tokens);
        if !find_duplicates(&sentences, &self.cfg.dedup, window.as_ref()).is_empty() {
            flags.insert(ResidualFlag::DuplicateSentences);
        }
        flags.into_iter().collect()
    }

    fn audit(&self, text: &str, r: &Resolved) -> AuditOutcome {
        let params = self.cfg.audit_params(&r.audience, Some(r.minutes));
        match self.cfg.audit_mode {
            AuditMode::Off => AuditOutcome::skipped("AUDIT_DISABLED"),
            AuditMode::InProcess => {
                let audit = audit_script(text, self.tables(), &params);
                if let Err(e) = self.trace.write_named_text("audit.txt", &audit.render()) {
                    log::warn!("trace write failed: {e:#}");
                }
                audit.outcome(params.trigram_threshold)
            }
            AuditMode::External => match self.cfg.external_audit() {
                Some(runner) => runner.run(text, &params),
                None => {
                    log::warn!("audit skipped: no [audit] command configured");
                    AuditOutcome::skipped(ScriptError::unavailable("no command configured").code())
                }
            },
        }
    }
}

fn record_budget(meta: &mut ScriptMeta, outcome: &BudgetOutcome) -> usize {
    meta.pads_added += outcome.pads_added;
    meta.words_trimmed += outcome.words_trimmed;
    if outcome.exhausted {
        log::warn!("length budget exhausted after {} attempts", outcome.attempts);
    }
    outcome.pads_added + usize::from(outcome.words_trimmed > 0)
}

/// Normalizes `request` with a silent pipeline.
pub fn normalize_script(cfg: &PipelineConfig, request: &ScriptRequest) -> Result<ScriptResponse, ScriptError> {
    let progress = ConsoleProgress::silent();
    ScriptPipeline::new(cfg, &progress).run(request)
}

/// Prompt, model call, block parsing and normalization. A model failure surfaces as
/// `MODEL_CALL_ERROR`.
pub fn generate_script(
    cfg: &PipelineConfig,
    model: &mut dyn TextModel,
    request: &ScriptRequest,
) -> Result<ScriptResponse, ScriptError> {
    let progress = ConsoleProgress::silent();
    ScriptPipeline::new(cfg, &progress).generate(model, request)
}

#[cfg(test)]
mod tests {
    use super::{generate_script, normalize_script, ScriptPipeline};
    use crate::audit::AuditStatus;
    use crate::error::ScriptError;
    use crate::model::{FallbackModel, ModelError, ModelRequest, TextModel};
    use crate::progress::ConsoleProgress;
    use crate::pipeline::api::ScriptRequest;
    use crate::pipeline::config::{AuditMode, PipelineConfig};

    struct Canned(Result<String, ModelError>);

    impl TextModel for Canned {
        fn provider(&self) -> &str {
            "canned"
        }

        fn generate(&mut self, request: &ModelRequest) -> Result<String, ModelError> {
            assert!(request.prompt.contains("Topic: respiro e cammino"));
            self.0.clone()
        }
    }

    fn request() -> ScriptRequest {
        ScriptRequest {
            topic: "respiro e cammino".to_string(),
            audience: Some("over60".to_string()),
            script_type: Some("howto".to_string()),
            minutes: Some(7),
            ..ScriptRequest::default()
        }
    }

    #[test]
    fn missing_topic_is_rejected() {
        let cfg = PipelineConfig::default();
        let mut req = request();
        req.topic = "  ".to_string();
        req.raw_generated_blocks = Some(vec!["x".to_string()]);
        let err = normalize_script(&cfg, &req).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn bad_model_output_is_a_format_error() {
        let cfg = PipelineConfig::default();
        let mut req = request();
        req.model_output = Some("{\"blocks\": []}".to_string());
        let err = normalize_script(&cfg, &req).unwrap_err();
        assert!(matches!(err, ScriptError::FormatNotRespected(ref r) if r == "blocks_empty"));
    }

    #[test]
    fn model_errors_surface() {
        let cfg = PipelineConfig::default();
        let mut model = Canned(Err(ModelError {
            provider: "canned".to_string(),
            status: Some(500),
            code: None,
            message: "down".to_string(),
        }));
        let err = generate_script(&cfg, &mut model, &request()).unwrap_err();
        assert_eq!(err.code(), "MODEL_CALL_ERROR");
    }

    #[test]
    fn generated_blocks_are_normalized() {
        let mut cfg = PipelineConfig::default();
        cfg.audit_mode = AuditMode::Off;
        let mut model = Canned(Ok(
            "```json\n{\"blocks\": [\"Il respiro guida il passo.\", \"Cammina piano.\"]}\n```".to_string(),
        ));
        let resp = generate_script(&cfg, &mut model, &request()).unwrap();
        assert_eq!(resp.block_word_counts.len(), 7);
        assert_eq!(resp.meta.provider_used.as_deref(), Some("canned"));
        assert_eq!(resp.meta.script_type, "howto");
        assert!(matches!(resp.audit.status, AuditStatus::Skipped { .. }));
        assert_eq!(resp.word_count, crate::textutil::word_count(&resp.final_script));
    }

    #[test]
    fn rate_limited_primary_falls_back() {
        let mut cfg = PipelineConfig::default();
        cfg.audit_mode = AuditMode::Off;
        let progress = ConsoleProgress::silent();
        let pipeline = ScriptPipeline::new(&cfg, &progress);
        let limited = Canned(Err(ModelError {
            provider: "canned".to_string(),
            status: Some(429),
            code: None,
            message: "slow down".to_string(),
        }));
        let backup = Canned(Ok("{\"blocks\": [\"Il respiro guida il passo.\"]}".to_string()));
        let mut model = FallbackModel::new(Box::new(limited), Some(Box::new(backup)));
        let resp = pipeline.generate_with_fallback(&mut model, &request()).unwrap();
        assert!(resp.meta.fallback_used);
        assert!(resp.meta.last_error.is_some());
        assert_eq!(resp.block_word_counts.len(), 7);
    }
}
