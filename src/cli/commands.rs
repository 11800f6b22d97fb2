//! CLI command definitions for formsweep.
//!
//! `run` (the default when no subcommand is given) executes the whole
//! experiment catalog and writes the summary. `list` prints the catalog and
//! `summarize` regenerates the summary from an existing output root.

use crate::catalog::{default_catalog, load_extra_descriptors, ExperimentDescriptor, GroupTable};
use crate::experiment_log::{join_channels, ExperimentLog};
use crate::report::{Reporter, DEFAULT_RESULTS_FILE};
use crate::runner::{
    resolve_channels, CommandEngine, ExperimentEngine, JobResult, OptionalSettings, ParamStyle,
    RunConfig, DEFAULT_TIMEOUT_SECS,
};
use crate::scheduler::Scheduler;
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::prompt::prompt_optional_settings;

/// Default root directory for experiment outputs.
const DEFAULT_OUTPUT_ROOT: &str = "./experiments";

/// Default prepared data archive.
const DEFAULT_DATA_PATH: &str = "./data/forming_dataset.npz";

/// Default analysis notebook.
const DEFAULT_NOTEBOOK: &str = "analysis.ipynb";

/// Default engine program.
const DEFAULT_ENGINE: &str = "papermill";

/// Batch runner for sheet-metal forming classification experiments.
#[derive(Parser)]
#[command(name = "formsweep")]
#[command(about = "Run a catalog of forming classification experiments with bounded concurrency")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
#[command(
    long_about = "formsweep runs one analysis-engine invocation per experiment (single channels and channel groups, for both Ironing and DeepDrawing), records every outcome in a shared experiment log, and writes a summary with the extracted metrics.\n\nExample usage:\n  formsweep run --max-concurrent 3 --group-tag sweep-01 --no-prompt"
)]
pub struct Cli {
    /// The subcommand to execute (defaults to `run`).
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Arguments for the implicit `run` command.
    #[command(flatten)]
    pub run: RunArgs,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run every experiment of the catalog and write the summary.
    Run(RunArgs),

    /// Print the experiment catalog.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Regenerate the summary from an existing experiment log.
    Summarize(SummarizeArgs),
}

/// How engine parameters are passed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ParamStyleArg {
    /// `-p key value`, lists as `-y "key: [..]"`.
    #[default]
    Papermill,
    /// `--key value`, lists comma-separated.
    LongFlags,
}

impl From<ParamStyleArg> for ParamStyle {
    fn from(style: ParamStyleArg) -> Self {
        match style {
            ParamStyleArg::Papermill => ParamStyle::Papermill,
            ParamStyleArg::LongFlags => ParamStyle::LongFlags,
        }
    }
}

/// Arguments for `formsweep run`.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Root directory for experiment outputs, the log and the summary.
    #[arg(long, env = "FORMSWEEP_OUTPUT_ROOT", default_value = DEFAULT_OUTPUT_ROOT)]
    pub output_root: PathBuf,

    /// Prepared data archive passed to every experiment.
    #[arg(long, env = "FORMSWEEP_DATA_PATH", default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Analysis notebook executed by papermill.
    #[arg(long, env = "FORMSWEEP_NOTEBOOK", default_value = DEFAULT_NOTEBOOK)]
    pub notebook: String,

    /// Engine program. `papermill` runs the notebook; anything else is run
    /// with `--engine-arg` values followed by the parameters.
    #[arg(long, env = "FORMSWEEP_ENGINE", default_value = DEFAULT_ENGINE)]
    pub engine: String,

    /// Leading argument for a custom engine (repeatable). `{output_dir}` is
    /// replaced by the experiment's output directory.
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Parameter style for a custom engine.
    #[arg(long, value_enum, default_value_t = ParamStyleArg::Papermill)]
    pub param_style: ParamStyleArg,

    /// Maximum number of experiments running at once.
    #[arg(short = 'j', long, env = "FORMSWEEP_MAX_CONCURRENT", default_value = "2")]
    pub max_concurrent: usize,

    /// Per-experiment timeout in seconds.
    #[arg(long, env = "FORMSWEEP_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Experiment tracking group forwarded to the engine.
    #[arg(long)]
    pub group_tag: Option<String>,

    /// Number of leading timesteps the engine should skip.
    #[arg(long)]
    pub skip_timesteps: Option<u32>,

    /// YAML file with additional experiment descriptors.
    #[arg(long)]
    pub extra: Option<PathBuf>,

    /// Never prompt for optional settings.
    #[arg(long)]
    pub no_prompt: bool,

    /// Name of the results artifact each experiment writes.
    #[arg(long, default_value = DEFAULT_RESULTS_FILE)]
    pub results_file: String,
}

impl RunArgs {
    /// Whether optional settings should be asked for interactively.
    pub fn needs_prompt(&self, stdin_is_terminal: bool) -> bool {
        stdin_is_terminal
            && !self.no_prompt
            && self.group_tag.is_none()
            && self.skip_timesteps.is_none()
    }

    fn flag_settings(&self) -> OptionalSettings {
        OptionalSettings {
            group_tag: self.group_tag.clone(),
            skip_first_n_timesteps: self.skip_timesteps,
        }
    }

    /// Builds the shared run configuration.
    pub fn run_config(&self, settings: OptionalSettings) -> anyhow::Result<RunConfig> {
        let config = settings.apply(
            RunConfig::new(&self.output_root)
                .with_data_path(&self.data_path)
                .with_timeout(Duration::from_secs(self.timeout_secs))
                .with_results_file_name(&self.results_file),
        );
        config.validate().context("Invalid run configuration")?;
        Ok(config)
    }

    /// Builds the engine selected by the arguments.
    pub fn command_engine(&self) -> CommandEngine {
        if self.engine == DEFAULT_ENGINE && self.engine_args.is_empty() {
            return CommandEngine::papermill(&self.notebook);
        }
        let args = if self.engine_args.is_empty() {
            vec![self.notebook.clone()]
        } else {
            self.engine_args.clone()
        };
        CommandEngine::new(&self.engine)
            .with_args(args)
            .with_style(self.param_style.into())
    }
}

/// Arguments for `formsweep list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// YAML file with additional experiment descriptors.
    #[arg(long)]
    pub extra: Option<PathBuf>,

    /// Output JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `formsweep summarize`.
#[derive(Parser, Debug)]
pub struct SummarizeArgs {
    /// Root directory holding the experiment log and outputs.
    #[arg(long, env = "FORMSWEEP_OUTPUT_ROOT", default_value = DEFAULT_OUTPUT_ROOT)]
    pub output_root: PathBuf,

    /// YAML file with additional experiment descriptors.
    #[arg(long)]
    pub extra: Option<PathBuf>,

    /// Name of the results artifact each experiment writes.
    #[arg(long, default_value = DEFAULT_RESULTS_FILE)]
    pub results_file: String,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Run(cli.run)) {
        Commands::Run(args) => run_batch_command(args).await,
        Commands::List(args) => run_list_command(args),
        Commands::Summarize(args) => run_summarize_command(args),
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

/// Machine-readable record of a finished batch.
#[derive(Debug, Serialize)]
struct BatchRecord<'a> {
    output_root: &'a Path,
    engine: &'a str,
    max_concurrent: usize,
    successful: u64,
    failed: u64,
    peak_in_flight: usize,
    elapsed_secs: f64,
    total_job_secs: f64,
    results: &'a [JobResult],
}

async fn run_batch_command(args: RunArgs) -> anyhow::Result<()> {
    if args.max_concurrent == 0 {
        anyhow::bail!("--max-concurrent must be at least 1");
    }

    let settings = if args.needs_prompt(std::io::stdin().is_terminal()) {
        tokio::task::spawn_blocking(|| {
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut output = std::io::stdout();
            prompt_optional_settings(&mut input, &mut output)
        })
        .await
        .context("Prompt task failed")?
        .context("Failed to read optional settings")?
    } else {
        args.flag_settings()
    };

    let config = args.run_config(settings)?;
    let catalog = load_catalog(args.extra.as_deref())?;
    let engine: Arc<dyn ExperimentEngine> = Arc::new(args.command_engine());

    if !config.data_path.exists() {
        warn!(path = %config.data_path.display(), "Data archive does not exist");
    }

    fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "Failed to create output root {}",
            config.output_root.display()
        )
    })?;
    let log = Arc::new(ExperimentLog::create(config.log_path())?);

    info!(
        experiments = catalog.len(),
        max_concurrent = args.max_concurrent,
        engine = %engine.name(),
        output_root = %config.output_root.display(),
        group_tag = config.group_tag.as_deref().unwrap_or(""),
        skip_first_n_timesteps = config.skip_first_n_timesteps.unwrap_or(0),
        "Starting experiment batch"
    );

    let start_time = Instant::now();
    let scheduler = Scheduler::new(config.clone(), Arc::clone(&engine), log);
    let results = scheduler
        .run_all(catalog.clone(), args.max_concurrent)
        .await?;
    let stats = scheduler.stats();

    let record = BatchRecord {
        output_root: &config.output_root,
        engine: engine.name(),
        max_concurrent: args.max_concurrent,
        successful: stats.successful,
        failed: stats.failed,
        peak_in_flight: stats.peak_in_flight,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
        total_job_secs: stats.total_job_duration.as_secs_f64(),
        results: &results,
    };
    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| anyhow::anyhow!("Failed to serialize batch results: {}", e))?;
    let batch_results_path = config.batch_results_path();
    fs::write(&batch_results_path, json).with_context(|| {
        format!(
            "Failed to write batch results {}",
            batch_results_path.display()
        )
    })?;
    info!(path = %batch_results_path.display(), "Batch results written");

    let report = Reporter::from_config(&config)?.summarize(&catalog)?;
    println!("{}", report.render());
    println!("Summary written to {}", config.summary_path().display());

    Ok(())
}

fn load_catalog(extra: Option<&Path>) -> anyhow::Result<Vec<ExperimentDescriptor>> {
    let extra = match extra {
        Some(path) => load_extra_descriptors(path)?,
        None => Vec::new(),
    };
    Ok(default_catalog(&extra)?)
}

// ============================================================================
// List / Summarize Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct CatalogRow {
    name: String,
    portion: String,
    channels: Vec<u8>,
    target: String,
}

fn catalog_rows(catalog: &[ExperimentDescriptor], groups: &GroupTable) -> Vec<CatalogRow> {
    catalog
        .iter()
        .map(|descriptor| CatalogRow {
            name: descriptor.name().to_string(),
            portion: match descriptor.group_tag() {
                Some(tag) => format!("{} ({})", descriptor.portion_kind(), tag),
                None => descriptor.portion_kind().to_string(),
            },
            channels: resolve_channels(descriptor, groups).unwrap_or_default(),
            target: descriptor.target().to_string(),
        })
        .collect()
}

fn run_list_command(args: ListArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(args.extra.as_deref())?;
    let rows = catalog_rows(&catalog, &GroupTable::default());

    if args.json {
        let json = serde_json::to_string_pretty(&rows)
            .map_err(|e| anyhow::anyhow!("Failed to serialize catalog: {}", e))?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "{:<28} {:<16} {:<20} {}",
        "NAME", "PORTION", "CHANNELS", "TARGET"
    );
    for row in &rows {
        println!(
            "{:<28} {:<16} {:<20} {}",
            row.name,
            row.portion,
            join_channels(&row.channels),
            row.target
        );
    }
    println!("\n{} experiments", rows.len());
    Ok(())
}

fn run_summarize_command(args: SummarizeArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(args.extra.as_deref())?;
    let config = RunConfig::new(&args.output_root).with_results_file_name(&args.results_file);

    let report = Reporter::from_config(&config)?
        .summarize(&catalog)
        .with_context(|| format!("Failed to summarize {}", args.output_root.display()))?;
    println!("{}", report.render());
    Ok(())
}
