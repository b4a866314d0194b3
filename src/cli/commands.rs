//! CLI command definitions for selfplay-pipeline.
//!
//! Running the binary without a subcommand runs the pipeline with its fixed
//! defaults: the seed phase followed by 100 loop iterations.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser};
use serde::Serialize;
use tracing::{error, info};

use crate::pipeline::{FailurePolicy, PipelineConfig, PipelineDriver, PipelinePlan, RunReport};
use crate::storage::RecordFilter;

/// Driver for the self-play reinforcement-learning loop.
#[derive(Parser)]
#[command(name = "selfplay-pipeline")]
#[command(about = "Run the self-play, status, and training loop")]
#[command(version)]
#[command(
    long_about = "selfplay-pipeline runs the self-play generator, status extractor and trainer in sequence: once from the supervised-learning model, then 100 times from the reinforcement-learning model.\n\nWith no subcommand it runs the pipeline with its default paths.\n\nExample usage:\n  selfplay-pipeline run --iterations 10 --on-failure continue --report reports/run.json"
)]
pub struct Cli {
    /// The subcommand to execute (defaults to `run`).
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the seed phase and every loop iteration.
    Run(RunArgs),

    /// Print the invocation schedule without running anything.
    #[command(alias = "dry-run")]
    Plan(PlanArgs),

    /// Count the game records accumulated in the archive.
    Archive(ArchiveArgs),
}

/// Configuration overrides shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// YAML config file; missing keys keep their defaults.
    #[arg(short = 'c', long, env = "PIPELINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of reinforcement-learning iterations after the seed phase.
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// Directory the stages run in.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Kifu archive directory passed to self-play and training.
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,

    /// Supervised-learning model used by the seed self-play.
    #[arg(long)]
    pub sl_model: Option<PathBuf>,

    /// Reinforcement-learning model used by every loop self-play.
    #[arg(long)]
    pub rl_model: Option<PathBuf>,

    /// Value passed to self-play as `--use-gpu`.
    #[arg(long)]
    pub use_gpu: Option<bool>,

    /// What to do when a stage fails: fail-fast or continue.
    #[arg(long)]
    pub on_failure: Option<FailurePolicy>,

    /// Kill a stage that runs longer than this many seconds.
    #[arg(long)]
    pub stage_timeout_secs: Option<u64>,

    /// Start at loop iteration 1 without the seed phase.
    #[arg(long)]
    pub skip_seed: bool,
}

impl ConfigArgs {
    /// Builds the effective configuration: defaults, config file,
    /// environment, then these flags.
    pub fn resolve(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref()).with_context(|| {
            match &self.config {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            }
        })?;

        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(dir) = &self.archive_dir {
            config.archive_dir = dir.clone();
        }
        if let Some(path) = &self.sl_model {
            config.sl_model = path.clone();
        }
        if let Some(path) = &self.rl_model {
            config.rl_model = path.clone();
        }
        if let Some(use_gpu) = self.use_gpu {
            config.use_gpu = use_gpu;
        }
        if let Some(policy) = self.on_failure {
            config.on_failure = policy;
        }
        if let Some(secs) = self.stage_timeout_secs {
            config.stage_timeout_secs = Some(secs);
        }
        if self.skip_seed {
            config.skip_seed = true;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Arguments for `selfplay-pipeline run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write a JSON run report to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the run report as JSON when done.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `selfplay-pipeline plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output the schedule as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `selfplay-pipeline archive`.
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Count every file, not only `.sgf` records.
    #[arg(long)]
    pub all: bool,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
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
    let command = cli.command.unwrap_or_else(|| {
        Commands::Run(RunArgs {
            config: ConfigArgs {
                config: std::env::var_os("PIPELINE_CONFIG").map(PathBuf::from),
                ..Default::default()
            },
            ..Default::default()
        })
    });

    match command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Plan(args) => run_plan_command(args),
        Commands::Archive(args) => run_archive_command(args),
    }
}

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = args.config.resolve()?;
    if let Some(path) = args.report {
        config.report_path = Some(path);
    }

    let driver = PipelineDriver::new(config)?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, stopping...");
    };

    let report = driver.run_until(shutdown).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_summary(&report);
    }
    Ok(())
}

fn print_report_summary(report: &RunReport) {
    println!("\n=== Pipeline Run {} ===", report.run_id);
    println!("Invocations:    {}", report.stats.invocations);
    println!("Succeeded:      {}", report.stats.succeeded);
    println!("Failed:         {}", report.stats.failed);
    println!("Stage time:     {:.1}s", report.stats.stage_time.as_secs_f64());

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!("\nFailed stages:");
        for outcome in failures {
            println!(
                "  {} {}: {}",
                outcome.phase,
                outcome.stage,
                outcome.reason()
            );
        }
    }
}

fn run_plan_command(args: PlanArgs) -> anyhow::Result<()> {
    let config = args.config.resolve()?;
    let plan = PipelinePlan::build(&config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("# working directory: {}", config.work_dir.display());
    for invocation in plan.invocations() {
        println!(
            "{:<14} {:<10} {}",
            invocation.phase.to_string(),
            invocation.stage.as_str(),
            invocation.command_line()
        );
    }
    println!(
        "# {} invocations over {} phases, on failure: {}",
        plan.len(),
        plan.phase_count(),
        config.on_failure
    );
    Ok(())
}

#[derive(Serialize)]
struct ArchiveSummary {
    path: PathBuf,
    exists: bool,
    files: u64,
    bytes: u64,
}

fn run_archive_command(args: ArchiveArgs) -> anyhow::Result<()> {
    let config = args.config.resolve()?;
    let archive = config.archive();
    let filter = if args.all {
        RecordFilter::All
    } else {
        RecordFilter::Kifu
    };
    let census = archive.census(filter);

    let summary = ArchiveSummary {
        path: archive.location().to_path_buf(),
        exists: archive.exists(),
        files: census.files,
        bytes: census.bytes,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !summary.exists {
        println!("{} does not exist yet", summary.path.display());
    } else {
        println!(
            "{}: {} {} ({} bytes)",
            summary.path.display(),
            summary.files,
            if args.all { "files" } else { "kifu" },
            summary.bytes
        );
    }
    Ok(())
}
