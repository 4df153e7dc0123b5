//! HDL Eval - adaptive iterative refinement for generated Verilog
//!
//! The `hdleval` command evaluates LLM generators on a task manifest.
//!
//! ## Commands
//!
//! - `run`: evaluate one or more models with iterative refinement
//! - `validate`: check a manifest and the local toolchain
//! - `config`: print the effective configuration as TOML

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use hdleval_core::{
    append_run_record, init_tracing, load_manifest, render_summary_table, run_batch, summarize,
    validate_tasks, Candidate, Collaborators, ConfidenceEstimator, ConfidenceLedger, ConfigPreset,
    EditDistanceEstimator, EvalMode, ExtractModule, FsGenerationCache, GenerationCache, Generator,
    NoCache, NullEstimator, RefinementController, RunConfiguration, RunRecord, Synthesizer, Task,
    METRICS,
};
use hdleval_tools::{
    probe_tools, CompilerKind, HdlCompiler, IcarusSimulator, OllamaConfig, OllamaGenerator,
    ReferenceTraceAnalyzer, YosysEquivalenceChecker, YosysSynthesizer,
};

#[derive(Parser)]
#[command(name = "hdleval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Adaptive iterative refinement benchmark for generated HDL", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON results on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate models against a task manifest
    Run(RunArgs),

    /// Check that every task's reference files exist and list available tools
    Validate {
        /// Path to the task manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config {
        #[arg(long, value_enum, default_value_t = PresetArg::Refinement)]
        preset: PresetArg,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// TOML file layered over the preset
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to the task manifest (JSON)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Model to evaluate (repeatable)
    #[arg(long = "model", required = true)]
    models: Vec<String>,

    /// Ollama server base URL
    #[arg(long, env = "OLLAMA_BASE_URL")]
    ollama_url: Option<String>,

    #[arg(long, value_enum, default_value_t = PresetArg::Refinement)]
    preset: PresetArg,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// TOML file layered over the preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only evaluate these task ids (repeatable)
    #[arg(long = "task")]
    tasks: Vec<String>,

    #[arg(long, default_value_t = 1)]
    repetitions: u32,

    /// Runs evaluated concurrently
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Output directory for results, artifacts and the generation cache
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Syntax checker: iverilog or verilator
    #[arg(long, default_value = "iverilog")]
    compiler: CompilerKind,

    /// Override max_iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Override the per-task wall-clock budget, in seconds
    #[arg(long)]
    budget: Option<f64>,

    /// Disable the on-disk generation cache
    #[arg(long)]
    no_cache: bool,

    /// Synthesize each run's best candidate and record its cell count
    #[arg(long)]
    synthesize: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    Refinement,
    Targeted,
}

impl From<PresetArg> for ConfigPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Refinement => ConfigPreset::Refinement,
            PresetArg::Targeted => ConfigPreset::Targeted,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Fast,
    Strict,
}

impl From<ModeArg> for EvalMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Fast => EvalMode::Fast,
            ModeArg::Strict => EvalMode::Strict,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args, cli.json).await,
        Commands::Validate { manifest } => cmd_validate(&manifest, cli.json),
        Commands::Config {
            preset,
            mode,
            config,
        } => cmd_config(preset, mode, config.as_deref()),
    }
}

/// Preset, then the TOML file (if any) merged over it, then the mode.
fn load_config(
    preset: PresetArg,
    mode: Option<ModeArg>,
    file: Option<&Path>,
) -> Result<RunConfiguration> {
    let mut config = RunConfiguration::preset(preset.into());

    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let overlay: toml::Value =
            toml::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))?;
        let mut merged = toml::Value::try_from(&config).context("Failed to encode preset")?;
        merge_toml(&mut merged, overlay);
        config = merged
            .try_into()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;
    }

    if let Some(mode) = mode {
        config = config.with_mode(mode.into());
    }
    Ok(config)
}

/// Recursively overlay `overlay` onto `base`; tables merge, anything else replaces.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn cmd_config(preset: PresetArg, mode: Option<ModeArg>, file: Option<&Path>) -> Result<()> {
    let config = load_config(preset, mode, file)?;
    config.validate().context("Configuration rejected")?;
    let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{text}");
    Ok(())
}

fn cmd_validate(manifest: &Path, json: bool) -> Result<()> {
    let tasks = load_manifest(manifest)
        .with_context(|| format!("Failed to load manifest: {:?}", manifest))?;
    let missing = validate_tasks(&tasks);
    let tools = probe_tools();

    if json {
        let report = serde_json::json!({
            "tasks": tasks.len(),
            "missing": missing,
            "tools": tools,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Tasks: {}", tasks.len());
        for m in &missing {
            match &m.path {
                Some(path) => println!("  missing {:?} for {}: {:?}", m.kind, m.task_id, path),
                None => println!("  no {:?} declared for {}", m.kind, m.task_id),
            }
        }
        if missing.is_empty() {
            println!("All {} tasks validated successfully", tasks.len());
        }
        println!("Tools:");
        for tool in &tools {
            match &tool.path {
                Some(path) => println!("  {:<10} {:?}", tool.name, path),
                None => println!("  {:<10} not found", tool.name),
            }
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("{} reference file(s) missing", missing.len());
    }
    Ok(())
}

fn build_collaborators(
    config: &RunConfiguration,
    args: &RunArgs,
    ledger: Arc<ConfidenceLedger>,
) -> Result<Collaborators> {
    let compiler = HdlCompiler::new(args.compiler);
    if !hdleval_core::Compiler::is_available(&compiler) {
        warn!(compiler = %args.compiler, "compiler not found, syntax checks disabled");
    }
    let simulator = IcarusSimulator;
    if !hdleval_core::Simulator::is_available(&simulator) {
        warn!("iverilog/vvp not found, simulation disabled");
    }

    let confidence: Arc<dyn ConfidenceEstimator> = if config.confidence.enabled {
        Arc::new(EditDistanceEstimator)
    } else {
        Arc::new(NullEstimator)
    };

    let cache: Arc<dyn GenerationCache> = if config.generation_cache {
        let root = args.output.join("cache");
        Arc::new(
            FsGenerationCache::new(&root)
                .with_context(|| format!("Failed to open generation cache at {:?}", root))?,
        )
    } else {
        Arc::new(NoCache)
    };

    Ok(Collaborators::new()
        .with_compiler(Arc::new(compiler))
        .with_simulator(Arc::new(simulator))
        .with_equivalence(Arc::new(YosysEquivalenceChecker))
        .with_waveform(Arc::new(ReferenceTraceAnalyzer::new()))
        .with_confidence(confidence)
        .with_cache(cache)
        .with_post_process(Arc::new(ExtractModule))
        .with_ledger(ledger))
}

fn select_tasks(tasks: Vec<Task>, filter: &[String]) -> Vec<Task> {
    if filter.is_empty() {
        return tasks;
    }
    tasks
        .into_iter()
        .filter(|t| filter.iter().any(|id| id == &t.task_id))
        .collect()
}

async fn cmd_run(args: RunArgs, json: bool) -> Result<()> {
    let mut config = load_config(args.preset, args.mode, args.config.as_deref())?;
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    if let Some(budget) = args.budget {
        config.task_budget_secs = budget;
    }
    if args.no_cache {
        config.generation_cache = false;
    }
    config.validate().context("Configuration rejected")?;

    let tasks = load_manifest(&args.manifest)
        .with_context(|| format!("Failed to load manifest: {:?}", args.manifest))?;
    for m in validate_tasks(&tasks) {
        warn!(task_id = %m.task_id, kind = ?m.kind, path = ?m.path, "reference file missing");
    }
    let tasks = select_tasks(tasks, &args.tasks);
    if tasks.is_empty() {
        anyhow::bail!("No tasks selected from {:?}", args.manifest);
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {:?}", args.output))?;

    let ledger = Arc::new(ConfidenceLedger::new());
    let collaborators = build_collaborators(&config, &args, Arc::clone(&ledger))?;
    let controller = Arc::new(
        RefinementController::new(config, collaborators).with_artifacts(args.output.join("runs")),
    );

    let generators: Vec<Arc<dyn Generator>> = args
        .models
        .iter()
        .map(|model| {
            let mut ollama = OllamaConfig::from_env(model.as_str());
            if let Some(url) = &args.ollama_url {
                ollama = ollama.with_base_url(url.as_str());
            }
            Arc::new(OllamaGenerator::new(ollama)) as Arc<dyn Generator>
        })
        .collect();

    info!(
        tasks = tasks.len(),
        models = generators.len(),
        repetitions = args.repetitions,
        "starting evaluation"
    );
    let results = run_batch(
        controller,
        tasks.clone(),
        generators,
        args.repetitions,
        args.concurrency,
    )
    .await;

    let results_path = args.output.join("results.jsonl");
    let mut records = Vec::with_capacity(results.len());
    for mut result in results {
        if args.synthesize {
            let stats = synthesize_best(&args.output, &result.outcome.best).await;
            result.outcome.best.synthesis = stats;
        }
        let record = RunRecord::from_outcome(&result.outcome);
        append_run_record(&results_path, &record)?;
        if json {
            println!("{}", serde_json::to_string(&record)?);
        }
        records.push(record);
    }

    if !json {
        println!("{}", render_summary_table(&summarize(&records)));
        match ledger.correlation() {
            Some(r) => println!("Entropy/success correlation: {r:.3} ({} points)", ledger.len()),
            None => println!("Entropy/success correlation: n/a ({} points)", ledger.len()),
        }
        println!("Results written to {:?}", results_path);
    }

    METRICS.flush();
    Ok(())
}

async fn synthesize_best(
    output: &Path,
    best: &hdleval_core::EvaluationMetrics,
) -> Option<hdleval_core::SynthesisStats> {
    let synthesizer = YosysSynthesizer;
    if !synthesizer.is_available() || !best.attempt.syntax_valid {
        return None;
    }

    let workdir = output
        .join("synth")
        .join(path_segment(&best.task_id))
        .join(path_segment(&best.generator))
        .join(format!("rep_{}", best.repetition));
    let source_path = workdir.join("design.v");
    if let Err(e) = std::fs::create_dir_all(&workdir)
        .and_then(|_| std::fs::write(&source_path, &best.attempt.generated_code))
    {
        warn!(error = %e, "failed to stage design for synthesis");
        return None;
    }

    let candidate = Candidate {
        task_id: best.task_id.clone(),
        module_name: String::new(),
        code: best.attempt.generated_code.clone(),
        source_path,
        workdir,
    };
    Some(
        synthesizer
            .synthesize(&candidate, std::time::Duration::from_secs(60))
            .await,
    )
}

fn path_segment(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
