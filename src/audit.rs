//! Script audit with the metric contract of the external quality checker.
//!
//! [`audit_script`] computes everything in-process; [`ScriptAudit::render`] prints the
//! line-oriented report and [`parse_audit_report`] reads such a report back, whether it
//! came from the renderer or from the external tool run by [`ExternalAudit`].

use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cues::locate_cues;
use crate::error::ScriptError;
use crate::ngram::{find_repeated, NgramCount};
use crate::quality::hook_signals;
use crate::sentences::segment;
use crate::tables::RewriteTables;
use crate::textutil::{clean_for_match, fold_diacritics};
use crate::tokens::tokenize;

const RULE: &str = "============================================================";
const SEP: &str = "------------------------------------------------------------";
const HOOK_WORDS: usize = 30;
const AUDIT_WPM: f64 = 150.0;
const MAX_LOOP_GAP_SECS: f64 = 90.0;

static PARAGRAPH_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("paragraph split regex"));
static WORD_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)wordCount:\s*(\d+)").expect("word count regex"));
static HOOK_SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Hook:\s*(\d+)/10").expect("hook score regex"));
static RETENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Retention:\s*(\d+)/10").expect("retention regex"));
static PROMISE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)hookPromiseDetected:\s*(YES|NO)").expect("promise regex"));
static TRIGRAM_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bx(\d+)\b").expect("trigram count regex"));
static NUMBERED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s+(.*)$").expect("numbered line regex"));
static FINAL_PASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)FINAL:\s*PASS").expect("final pass regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditParams {
    pub audience: String,
    pub minutes: Option<u32>,
    pub trigram_threshold: usize,
}

impl Default for AuditParams {
    fn default() -> Self {
        Self {
            audience: "over60".to_string(),
            minutes: None,
            trigram_threshold: 3,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookAnalysis {
    pub banned_found: Vec<String>,
    pub has_problem: bool,
    pub has_promise: bool,
    pub score: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopGap {
    pub from_cue: String,
    pub to_cue: String,
    pub seconds: f64,
    pub pass: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceCheck {
    pub pass: bool,
    pub technical_hits: Vec<String>,
    pub groups_hit: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptAudit {
    pub source: String,
    pub audience: String,
    pub minutes: Option<u32>,
    pub trigram_threshold: usize,
    pub word_count: usize,
    pub base_words: Option<usize>,
    pub min_words: Option<usize>,
    pub max_words: Option<usize>,
    pub in_range: bool,
    pub hook: HookAnalysis,
    pub placeholders: Vec<String>,
    pub duplicates: Vec<(String, usize)>,
    pub repeated_trigrams: Vec<NgramCount>,
    pub cue_count: usize,
    pub gaps: Vec<LoopGap>,
    pub paragraphs: usize,
    pub avg_lines_per_paragraph: f64,
    pub audience_check: AudienceCheck,
    pub retention_score: u8,
    pub non_repetition_score: u8,
    pub fail_reasons: Vec<String>,
    pub pass: bool,
}

fn clamp10(score: i32) -> u8 {
    score.clamp(0, 10) as u8
}

fn analyze_hook(text: &str, tables: &RewriteTables) -> HookAnalysis {
    let tokens = tokenize(text);
    let first3: Vec<String> = segment(text, &tokens)
        .iter()
        .take(3)
        .map(|s| clean_for_match(s.text(text)))
        .collect();
    let mut banned_found: Vec<String> = Vec::new();
    for s in &first3 {
        for b in &tables.quality.banned_openers {
            if s.contains(b.as_str()) && !banned_found.contains(b) {
                banned_found.push(b.clone());
            }
        }
    }
    let (has_problem, has_promise) = hook_signals(text, tables);

    let mut score = 10;
    if !banned_found.is_empty() {
        score -= 4;
    }
    if !has_problem {
        score -= 3;
    }
    if !has_promise {
        score -= 3;
    }
    HookAnalysis {
        banned_found,
        has_problem,
        has_promise,
        score: clamp10(score),
    }
}

fn detect_placeholders(text: &str, tables: &RewriteTables) -> Vec<String> {
    let folded = fold_diacritics(text).to_lowercase();
    tables
        .quality
        .placeholders
        .iter()
        .filter(|m| folded.contains(m.as_str()))
        .cloned()
        .collect()
}

/// Exact duplicate sentences of at least four words, most repeated first.
fn exact_duplicates(text: &str) -> Vec<(String, usize)> {
    let tokens = tokenize(text);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for s in segment(text, &tokens) {
        if s.word_count() < 4 {
            continue;
        }
        *counts.entry(s.signature).or_insert(0) += 1;
    }
    let mut out: Vec<(String, usize)> = counts.into_iter().filter(|(_, c)| *c > 1).collect();
    out.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.len().cmp(&a.0.len()))
            .then_with(|| a.0.cmp(&b.0))
    });
    out
}

fn paragraph_stats(text: &str) -> (usize, f64) {
    let normalized = text.replace('\r', "");
    let line_counts: Vec<usize> = PARAGRAPH_SPLIT_RE
        .split(&normalized)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.lines().filter(|l| !l.trim().is_empty()).count())
        .collect();
    if line_counts.is_empty() {
        return (0, 0.0);
    }
    let avg = line_counts.iter().sum::<usize>() as f64 / line_counts.len() as f64;
    (line_counts.len(), avg)
}

fn audience_compliance(text: &str, audience: &str, tables: &RewriteTables) -> AudienceCheck {
    let clean = clean_for_match(text);
    let technical_hits: Vec<String> = tables
        .quality
        .technical_terms
        .iter()
        .filter(|t| clean.contains(t.as_str()))
        .cloned()
        .collect();
    let Some(profile) = tables.audience(audience) else {
        return AudienceCheck {
            pass: false,
            technical_hits,
            groups_hit: 0,
        };
    };
    let rules = &profile.audit;
    let groups_hit = rules
        .groups
        .values()
        .filter(|keys| keys.iter().any(|k| clean.contains(k.as_str())))
        .count();
    let avoided = rules.avoid.iter().any(|a| clean.contains(a.as_str()));
    let technical_ok = rules
        .max_technical
        .map_or(true, |max| technical_hits.len() <= max);
    let sentences_ok = rules.max_avg_sentence_words.map_or(true, |max| {
        let tokens = tokenize(text);
        let sentences = segment(text, &tokens);
        if sentences.is_empty() {
            return true;
        }
        let words: usize = sentences.iter().map(|s| s.word_count()).sum();
        words as f64 / sentences.len() as f64 <= max
    });
    AudienceCheck {
        pass: groups_hit >= rules.min_groups && !avoided && technical_ok && sentences_ok,
        technical_hits,
        groups_hit,
    }
}

fn retention_score(word_count: usize, cue_count: usize, gaps: &[LoopGap], paragraphs: usize, avg_lines: f64) -> u8 {
    let mut score: i32 = 10;
    if word_count > 180 && cue_count < 2 {
        score -= 4;
    }
    score -= 2 * gaps.iter().filter(|g| !g.pass).count() as i32;
    if avg_lines > 4.5 {
        score -= 2;
    }
    if avg_lines < 1.5 && paragraphs > 8 {
        score -= 1;
    }
    let score = clamp10(score);
    let minutes = word_count as f64 / AUDIT_WPM;
    if minutes < 5.0 {
        score.min(3)
    } else if minutes < 7.0 {
        score.min(6)
    } else {
        score
    }
}

fn non_repetition_score(duplicates: usize, trigrams: usize) -> u8 {
    let mut score: i32 = 10;
    if duplicates > 0 {
        score -= 6;
    }
    score -= trigrams.min(5) as i32;
    clamp10(score)
}

/// Audits `text` for an audience and optional target duration.
#[must_use]
pub fn audit_script(text: &str, tables: &RewriteTables, params: &AuditParams) -> ScriptAudit {
    let tokens = tokenize(text);
    let word_count = tokens.len();
    let base_words = params.minutes.map(|m| (f64::from(m) * AUDIT_WPM).round() as usize);
    let min_words = base_words.map(|b| (b as f64 * 0.85).round() as usize);
    let max_words = base_words.map(|b| (b as f64 * 1.15).round() as usize);
    let in_range = matches!((min_words, max_words), (Some(lo), Some(hi)) if word_count >= lo && word_count <= hi);

    let hook = analyze_hook(text, tables);
    let placeholders = detect_placeholders(text, tables);
    let duplicates = exact_duplicates(text);
    let repeated_trigrams = find_repeated(&tokens, 3, params.trigram_threshold, 10);

    let cues = locate_cues(&tokens, &tables.cues.phrases);
    let gaps: Vec<LoopGap> = cues
        .windows(2)
        .map(|w| {
            let seconds = (w[1].first_word - w[0].first_word) as f64 / AUDIT_WPM * 60.0;
            LoopGap {
                from_cue: clean_for_match(&w[0].phrase),
                to_cue: clean_for_match(&w[1].phrase),
                seconds,
                pass: seconds <= MAX_LOOP_GAP_SECS,
            }
        })
        .collect();
    let (paragraphs, avg_lines) = paragraph_stats(text);
    let audience_check = audience_compliance(text, &params.audience, tables);

    let retention = retention_score(word_count, cues.len(), &gaps, paragraphs, avg_lines);
    let non_rep = non_repetition_score(duplicates.len(), repeated_trigrams.len());

    let mut hard: Vec<String> = Vec::new();
    if !placeholders.is_empty() {
        hard.push(format!("Placeholder trovati: {}", placeholders.join(", ")));
    }
    if !hook.banned_found.is_empty() {
        hard.push(format!("Banned opener nel hook: {}", hook.banned_found.join(", ")));
    }
    if !duplicates.is_empty() {
        hard.push(format!("Frasi duplicate trovate: {}", duplicates.len()));
    }
    let hard_fail = !hard.is_empty();

    let mut fail_reasons = hard;
    if !hook.has_problem {
        fail_reasons.push("Nel hook (prime 30 parole) non rilevo problema reale.".to_string());
    }
    if !hook.has_promise {
        fail_reasons.push("Nel hook (prime 30 parole) non rilevo promessa/beneficio chiaro.".to_string());
    }
    if !audience_check.pass {
        fail_reasons.push(format!("Audience compliance FAIL per {}.", params.audience));
    }
    if retention < 7 {
        fail_reasons.push("Retention score sotto soglia (>=7).".to_string());
    }
    if non_rep < 8 {
        fail_reasons.push("Non-ripetizione sotto soglia (>=8).".to_string());
    }
    if hook.score < 8 {
        fail_reasons.push("Hook score sotto soglia (>=8).".to_string());
    }
    match (min_words, max_words) {
        (Some(lo), Some(hi)) if !in_range => fail_reasons.push(format!(
            "WORDCOUNT_OUT_OF_RANGE (wordCount={word_count}, range={lo}-{hi})"
        )),
        (None, _) | (_, None) => fail_reasons.push("MINUTES_TARGET_MISSING (--minutes=...)".to_string()),
        _ => {}
    }

    let pass = !hard_fail
        && hook.score >= 8
        && non_rep >= 8
        && retention >= 7
        && audience_check.pass
        && in_range;

    ScriptAudit {
        source: "<in-memory>".to_string(),
        audience: params.audience.clone(),
        minutes: params.minutes,
        trigram_threshold: params.trigram_threshold,
        word_count,
        base_words,
        min_words,
        max_words,
        in_range,
        hook,
        placeholders,
        duplicates,
        repeated_trigrams,
        cue_count: cues.len(),
        gaps,
        paragraphs,
        avg_lines_per_paragraph: avg_lines,
        audience_check,
        retention_score: retention,
        non_repetition_score: non_rep,
        fail_reasons,
        pass,
    }
}

fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| x.to_string())
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "YES"
    } else {
        "NO"
    }
}

impl ScriptAudit {
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Line-oriented report, one `key: value` per line.
    #[must_use]
    pub fn render(&self) -> String {
        let hook_words = self.word_count.min(HOOK_WORDS);
        let mut lines: Vec<String> = vec![
            RULE.to_string(),
            "SCRIPT FORGE - SCRIPT QUALITY AUDITOR".to_string(),
            RULE.to_string(),
            format!("File: {}", self.source),
            format!("Audience: {}", self.audience),
            format!("Target minutes: {}", opt(self.minutes)),
            format!("Trigram threshold: {}", self.trigram_threshold),
            SEP.to_string(),
            format!("wordCount: {}", self.word_count),
            format!("estimatedMinutes@130wpm: {:.2}", self.word_count as f64 / 130.0),
            format!("estimatedMinutes@150wpm: {:.2}", self.word_count as f64 / AUDIT_WPM),
            format!("baseWords: {}", opt(self.base_words)),
            format!("minWords: {}", opt(self.min_words)),
            format!("maxWords: {}", opt(self.max_words)),
            format!("inRange: {}", yes_no(self.in_range)),
            SEP.to_string(),
            format!("hookWordCount: {hook_words}"),
            format!("hookSeconds@150wpm: {:.1}", hook_words as f64 / AUDIT_WPM * 60.0),
            format!("hookProblemDetected: {}", yes_no(self.hook.has_problem)),
            format!("hookPromiseDetected: {}", yes_no(self.hook.has_promise)),
            format!(
                "hookBannedOpeners: {}",
                if self.hook.banned_found.is_empty() {
                    "none".to_string()
                } else {
                    self.hook.banned_found.join(", ")
                }
            ),
            SEP.to_string(),
            format!("paragraphs: {}", self.paragraphs),
            format!("avgLinesPerParagraph: {:.2}", self.avg_lines_per_paragraph),
            format!("exactDuplicateSentences: {}", self.duplicates.len()),
            format!("repeatedTrigrams(top10): {}", self.repeated_trigrams.len()),
            SEP.to_string(),
            "SCORES".to_string(),
            format!("Hook: {}/10", self.hook.score),
            format!("Retention: {}/10", self.retention_score),
            format!("Non-ripetizione: {}/10", self.non_repetition_score),
            SEP.to_string(),
            "Top repeated trigrams:".to_string(),
        ];
        if self.repeated_trigrams.is_empty() {
            lines.push("  - none".to_string());
        } else {
            for (i, t) in self.repeated_trigrams.iter().enumerate() {
                lines.push(format!("  {}. \"{}\" x{}", i + 1, t.ngram, t.count));
            }
        }
        lines.push(SEP.to_string());
        lines.push("Open-loop gaps (sec @150wpm):".to_string());
        if self.gaps.is_empty() {
            lines.push(if self.cue_count == 0 {
                "  - no cue found".to_string()
            } else {
                "  - only one cue found (no gap)".to_string()
            });
        } else {
            for (i, g) in self.gaps.iter().enumerate() {
                lines.push(format!(
                    "  {}. \"{}\" -> \"{}\" = {:.1}s {}",
                    i + 1,
                    g.from_cue,
                    g.to_cue,
                    g.seconds,
                    if g.pass { "[OK]" } else { "[FAIL]" }
                ));
            }
        }
        lines.push(SEP.to_string());
        lines.push(format!(
            "Audience compliance ({}): {}",
            self.audience,
            if self.audience_check.pass { "PASS" } else { "FAIL" }
        ));
        lines.push(format!(
            "Technical terms detected: {}",
            if self.audience_check.technical_hits.is_empty() {
                "none".to_string()
            } else {
                self.audience_check.technical_hits.join(", ")
            }
        ));
        lines.push(SEP.to_string());
        if self.fail_reasons.is_empty() {
            lines.push("FAIL reasons: none".to_string());
        } else {
            lines.push("FAIL reasons:".to_string());
            for (i, r) in self.fail_reasons.iter().enumerate() {
                lines.push(format!("  {}. {r}", i + 1));
            }
        }
        lines.push(SEP.to_string());
        lines.push(format!("FINAL: {}", if self.pass { "PASS" } else { "FAIL" }));
        lines.push(RULE.to_string());
        lines.join("\n")
    }

    /// The outcome a caller would get from running the external tool on the same text.
    #[must_use]
    pub fn outcome(&self, trigram_threshold: usize) -> AuditOutcome {
        let report = parse_audit_report(&self.render(), trigram_threshold);
        AuditOutcome {
            ran: true,
            status: if self.pass { AuditStatus::Pass } else { AuditStatus::Fail },
            exit_code: Some(if self.pass { 0 } else { 1 }),
            report,
            stderr: String::new(),
        }
    }
}

/// Fields read back from a line-oriented audit report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAudit {
    pub word_count: Option<usize>,
    pub hook_score: Option<u8>,
    pub retention_score: Option<u8>,
    pub hook_promise_detected: Option<bool>,
    pub open_loop_detected: bool,
    pub max_repeated_trigram_count: usize,
    pub has_trigram_ge_threshold: bool,
    pub fail_reasons: Vec<String>,
    pub final_pass: bool,
}

fn capture<T: std::str::FromStr>(re: &Regex, text: &str) -> Option<T> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[must_use]
pub fn parse_audit_report(stdout: &str, trigram_threshold: usize) -> ParsedAudit {
    let lines: Vec<&str> = stdout.lines().map(str::trim).collect();

    let mut fail_reasons = Vec::new();
    if let Some(start) = lines.iter().position(|l| l.to_lowercase().starts_with("fail reasons:")) {
        for line in &lines[start + 1..] {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(SEP) || line.to_uppercase().starts_with("FINAL:") {
                break;
            }
            if let Some(c) = NUMBERED_RE.captures(line) {
                fail_reasons.push(c[1].trim().to_string());
            }
        }
    }

    let mut max_tri = 0usize;
    if let Some(start) = lines.iter().position(|l| l.eq_ignore_ascii_case("top repeated trigrams:")) {
        for line in &lines[start + 1..] {
            if line.starts_with(SEP) {
                break;
            }
            if let Some(c) = capture::<usize>(&TRIGRAM_COUNT_RE, line) {
                max_tri = max_tri.max(c);
            }
        }
    }

    ParsedAudit {
        word_count: capture(&WORD_COUNT_RE, stdout),
        hook_score: capture(&HOOK_SCORE_RE, stdout),
        retention_score: capture(&RETENTION_RE, stdout),
        hook_promise_detected: PROMISE_RE
            .captures(stdout)
            .map(|c| c[1].eq_ignore_ascii_case("YES")),
        open_loop_detected: stdout.to_lowercase().contains("open-loop gaps"),
        max_repeated_trigram_count: max_tri,
        has_trigram_ge_threshold: max_tri >= trigram_threshold.max(1),
        fail_reasons,
        final_pass: FINAL_PASS_RE.is_match(stdout),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Pass,
    Fail,
    Skipped { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOutcome {
    pub ran: bool,
    #[serde(flatten)]
    pub status: AuditStatus,
    pub exit_code: Option<i32>,
    pub report: ParsedAudit,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl AuditOutcome {
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            ran: false,
            status: AuditStatus::Skipped {
                reason: reason.into(),
            },
            exit_code: None,
            report: ParsedAudit::default(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == AuditStatus::Pass
    }
}

/// Runs an external checker as `<command> <args..> <file> --audience=.. --minutes=..
/// --trigram-threshold=..` on a scoped temporary copy of the script.
#[derive(Clone, Debug)]
pub struct ExternalAudit {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ExternalAudit {
    /// Never fails: spawn errors and timeouts come back as `SKIPPED`.
    #[must_use]
    pub fn run(&self, text: &str, params: &AuditParams) -> AuditOutcome {
        match self.execute(text, params) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!("audit skipped: {err}");
                AuditOutcome::skipped(err.code())
            }
        }
    }

    fn execute(&self, text: &str, params: &AuditParams) -> Result<AuditOutcome, ScriptError> {
        let mut file = tempfile::Builder::new()
            .prefix("script_quality_")
            .suffix(".txt")
            .tempfile()
            .map_err(ScriptError::unavailable)?;
        file.write_all(text.as_bytes()).map_err(ScriptError::unavailable)?;
        file.flush().map_err(ScriptError::unavailable)?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg(file.path())
            .arg(format!("--audience={}", params.audience))
            .arg(format!("--minutes={}", params.minutes.unwrap_or(9)))
            .arg(format!("--trigram-threshold={}", params.trigram_threshold))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ScriptError::unavailable(format!("{}: {e}", self.command)))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    collect(stdout);
                    collect(stderr);
                    return Err(ScriptError::AuditToolTimeout {
                        secs: self.timeout.as_secs(),
                    });
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    collect(stdout);
                    collect(stderr);
                    return Err(ScriptError::unavailable(e));
                }
            }
        };

        let stdout = collect(stdout);
        let mut stderr = collect(stderr);
        if stderr.len() > 700 {
            let mut cut = 700;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }

        let report = parse_audit_report(&stdout, params.trigram_threshold);
        let exit_code = status.code();
        let pass = report.final_pass && exit_code == Some(0);
        Ok(AuditOutcome {
            ran: true,
            status: if pass { AuditStatus::Pass } else { AuditStatus::Fail },
            exit_code,
            report,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Joins a pipe reader; a missing or panicked reader yields an empty string.
fn collect(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
