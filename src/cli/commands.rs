//! CLI command definitions for boundline.
//!
//! `run` executes a pipeline and prints its tally; `config` prints the
//! effective configuration after file, environment and flag overrides.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{PipelineConfig, PipelineCoordinator, PipelineTally, UpstreamConfig};

/// Bounded-buffer production pipeline runner.
#[derive(Parser)]
#[command(name = "boundline")]
#[command(about = "Run a quota-driven production pipeline over bounded buffers")]
#[command(version)]
#[command(
    long_about = "boundline wires upstream stages, a production stage and a delivery stage together with bounded blocking buffers and runs them until every quota is met.\n\nExample usage:\n  boundline run --quantity 100000 --upstream milk:2:200 --upstream ferment:1:100 --batch-size 100"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the pipeline to completion and print the final tally.
    Run(RunArgs),

    /// Print the effective configuration as YAML without running.
    Config(ConfigArgs),
}

/// Configuration sources and overrides shared by every subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// YAML configuration file. When absent, PIPELINE_* environment variables are used.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Number of finished products to make.
    #[arg(short = 'q', long)]
    pub quantity: Option<u64>,

    /// Products withdrawn per delivery.
    #[arg(short = 'b', long)]
    pub batch_size: Option<u64>,

    /// Capacity of the production buffer.
    #[arg(long)]
    pub product_capacity: Option<usize>,

    /// Name of the production stage.
    #[arg(long)]
    pub product_name: Option<String>,

    /// Upstream stage as name:ratio[:capacity]. Repeat to add stages; replaces
    /// the configured upstream list.
    #[arg(short = 'u', long = "upstream")]
    pub upstream: Vec<UpstreamConfig>,

    /// Log progress every N milliseconds while running.
    #[arg(long)]
    pub progress_interval_ms: Option<u64>,
}

impl ConfigArgs {
    /// Loads the base configuration and applies flag overrides.
    ///
    /// The result is not validated; the coordinator does that.
    pub fn resolve(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load_yaml_file(path)?,
            None => PipelineConfig::load_env()?,
        };

        if let Some(quantity) = self.quantity {
            config.target_quantity = quantity;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(capacity) = self.product_capacity {
            config.product_capacity = capacity;
        }
        if let Some(name) = &self.product_name {
            config.product_name = name.clone();
        }
        if !self.upstream.is_empty() {
            config.upstream = self.upstream.clone();
        }
        if let Some(ms) = self.progress_interval_ms {
            config.progress_interval = (ms > 0).then(|| std::time::Duration::from_millis(ms));
        }

        Ok(config)
    }
}

/// Arguments for `boundline run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Output the tally as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Config(args) => run_config_command(args),
    }
}

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let config = args.config.resolve()?;

    if args.metrics {
        init_metrics()?;
    }

    info!(stages = config.upstream.len() + 2, "Pipeline configured");
    let tally = PipelineCoordinator::execute(config).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tally)?);
    } else {
        print_tally(&tally);
    }

    if args.metrics {
        print!("{}", export_metrics());
    }

    Ok(())
}

fn run_config_command(args: ConfigArgs) -> anyhow::Result<()> {
    let config = args.resolve()?;
    config.validate()?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn print_tally(tally: &PipelineTally) {
    println!("\n=== Pipeline Results ===");
    println!("Run id:      {}", tally.run_id);
    println!("Duration:    {} ms", tally.duration_ms);
    for stage in &tally.upstream {
        println!("{:<12} {}/{}", format!("{}:", stage.name), stage.completed, stage.quota);
    }
    println!(
        "{:<12} {}/{}",
        format!("{}:", tally.production.name),
        tally.production.completed,
        tally.production.quota
    );
    println!(
        "{:<12} {}/{}",
        "deliveries:", tally.deliveries.completed, tally.deliveries.quota
    );
}
