use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};

use script_forge::audit::audit_script;
use script_forge::pipeline::{init_default_config, PipelineConfig, ScriptPipeline, ScriptRequest};
use script_forge::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "script-forge")]
#[command(about = "Deterministic normalizer for seven-segment Italian narrative scripts", long_about = None)]
struct Args {
    /// Generate default config + rewrite tables, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/table files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Request JSON (topic, audience, type, minutes, rawGeneratedBlocks or modelOutput)
    #[arg(value_name = "REQUEST")]
    input: Option<PathBuf>,

    /// Output script (default: <input_stem>.script.txt)
    #[arg(short, long, value_name = "TXT")]
    output: Option<PathBuf>,

    /// Also write the full JSON response
    #[arg(long, value_name = "JSON")]
    report_json: Option<PathBuf>,

    /// Config file path (default: search for script-forge.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write per-stage snapshots to this directory (overrides [trace] dir)
    #[arg(long, value_name = "DIR")]
    trace_dir: Option<PathBuf>,

    #[arg(long)]
    topic: Option<String>,

    /// Audience profile (e.g. over60, over70)
    #[arg(long)]
    audience: Option<String>,

    /// Script type: howto, protocol, myth, mistakes, checklist, story
    #[arg(long = "type", value_name = "TYPE")]
    script_type: Option<String>,

    /// Target duration (clamped to the configured range)
    #[arg(long)]
    minutes: Option<u32>,

    /// Explicit rotation seed (default: derived from topic, audience and type)
    #[arg(long)]
    seed: Option<u64>,

    /// Print the generation prompt for the request, then exit
    #[arg(long)]
    prompt: bool,

    /// Audit an existing script and print the report; exit code 0 only on PASS
    #[arg(long, value_name = "TXT")]
    audit: Option<PathBuf>,

    /// No stage progress on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let workdir = args
        .input
        .as_deref()
        .or(args.audit.as_deref())
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut cfg = PipelineConfig::resolve(&workdir, args.config.clone()).context("load config")?;
    if let Some(dir) = args.trace_dir.clone() {
        cfg.trace_dir = Some(dir);
    }

    if let Some(path) = args.audit.as_deref() {
        let pass = run_audit(&cfg, path, &args)?;
        std::process::exit(if pass { 0 } else { 1 });
    }

    let request = match build_request(&args)? {
        Some(r) => r,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  script-forge <request.json>\n  script-forge --audit <script.txt> --audience over60 --minutes 9\n\nTIPS:\n  - Default config search: script-forge.toml (upwards), or set SCRIPT_FORGE_CONFIG.\n"
            );
            return Ok(());
        }
    };

    let pipeline = ScriptPipeline::new(&cfg, &progress);

    if args.prompt {
        let prompt = pipeline.prompt(&request).context("render prompt")?;
        println!("{prompt}");
        return Ok(());
    }

    let response = pipeline.run(&request).context("normalize script")?;

    let output = match args.output.clone() {
        Some(p) => p,
        None => {
            let input = args.input.clone().unwrap_or_else(|| PathBuf::from("script.json"));
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            input.with_file_name(format!("{stem}.script.txt"))
        }
    };
    std::fs::write(&output, &response.final_script)
        .with_context(|| format!("write script: {}", output.display()))?;
    progress.info(format!("Wrote script: {}", output.display()));

    if let Some(path) = args.report_json.as_deref() {
        let body = serde_json::to_string_pretty(&response).context("serialize response")?;
        std::fs::write(path, body).with_context(|| format!("write report: {}", path.display()))?;
        progress.info(format!("Wrote report: {}", path.display()));
    }

    if response.has_warning() {
        log::warn!(
            "residual flags: [{}], audit passed: {}",
            response
                .residual_flags
                .iter()
                .map(|f| f.label())
                .collect::<Vec<_>>()
                .join(", "),
            response.audit.passed()
        );
    }
    Ok(())
}

/// The request file (if any) with CLI overrides applied. `None` when there is nothing to run.
fn build_request(args: &Args) -> anyhow::Result<Option<ScriptRequest>> {
    let mut request = match args.input.as_deref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read request: {}", path.display()))?;
            serde_json::from_str::<ScriptRequest>(&text)
                .with_context(|| format!("parse request: {}", path.display()))?
        }
        None if args.topic.is_some() => ScriptRequest::default(),
        None => return Ok(None),
    };
    if let Some(topic) = args.topic.clone() {
        request.topic = topic;
    }
    if args.audience.is_some() {
        request.audience = args.audience.clone();
    }
    if args.script_type.is_some() {
        request.script_type = args.script_type.clone();
    }
    if args.minutes.is_some() {
        request.minutes = args.minutes;
    }
    if args.seed.is_some() {
        request.seed = args.seed;
    }
    Ok(Some(request))
}

fn run_audit(cfg: &PipelineConfig, path: &Path, args: &Args) -> anyhow::Result<bool> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read script: {}", path.display()))?;
    let params = cfg.audit_params(args.audience.as_deref().unwrap_or(""), args.minutes);
    let audit = audit_script(&text, &cfg.tables, &params).with_source(path.display().to_string());
    println!("{}", audit.render());
    Ok(audit.pass)
}
