//! petrotherm - thermal-property prediction from well logs
//!
//! # Usage
//!
//! ```bash
//! # Predict axial conductivity with the default configuration
//! petrotherm predict --logs logs.xlsx --core core.xlsx
//!
//! # Anisotropy run reusing an earlier axial prediction file
//! petrotherm predict --logs logs.csv --core core.csv --config aniso.toml \
//!     --axial-predictions predictions/LinearRegression_TC_par_false.csv
//!
//! # Write the default configuration for editing
//! petrotherm init-config
//! ```
//!
//! # Environment Variables
//!
//! - `PETROTHERM_CONFIG`: Path to the run configuration (default: ./petrotherm.toml)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use petrotherm::config::RunConfig;
use petrotherm::ingest;
use petrotherm::pipeline::PipelineSession;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "petrotherm")]
#[command(about = "Rock thermal-property prediction from well logs")]
#[command(version)]
struct CliArgs {
    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Train on core measurements and predict over the whole logged interval
    Predict {
        /// Well-log table (.csv or .xlsx)
        #[arg(long)]
        logs: PathBuf,
        /// Core measurement table (.csv or .xlsx)
        #[arg(long)]
        core: PathBuf,
        /// Run configuration; overrides PETROTHERM_CONFIG and ./petrotherm.toml
        #[arg(long)]
        config: Option<PathBuf>,
        /// Previously exported axial predictions (anisotropy mode)
        #[arg(long, value_name = "FILE")]
        axial_predictions: Option<PathBuf>,
        /// Output directory (default: export.output_dir from the config)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Write the default configuration to a TOML file
    InitConfig {
        #[arg(long, default_value = "petrotherm.toml")]
        output: PathBuf,
    },

    /// Print the column schema of a table
    Inspect {
        file: PathBuf,
    },
}

// ============================================================================
// Commands
// ============================================================================

fn run_predict(
    logs: &Path,
    core: &Path,
    config: Option<&Path>,
    axial_predictions: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<()> {
    let config = match config {
        Some(path) => RunConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunConfig::load().context("loading run config")?,
    };
    let output_dir = output_dir.map_or_else(|| config.export.output_dir.clone(), Path::to_path_buf);

    let logs = ingest::load_path(logs).with_context(|| format!("reading well logs {}", logs.display()))?;
    let core = ingest::load_path(core).with_context(|| format!("reading core data {}", core.display()))?;

    let mut session = PipelineSession::new(config);
    if let Some(path) = axial_predictions {
        let table = ingest::load_path(path)
            .with_context(|| format!("reading axial predictions {}", path.display()))?;
        session.provide_axial_predictions(table);
    }

    let outcome = session.run(logs, core).context("prediction run failed")?;
    println!(
        "{} | train={} test={} full={}",
        outcome.strategy.display_name(),
        outcome.train_rows,
        outcome.test_rows,
        outcome.full_rows
    );
    for m in &outcome.metrics {
        println!(
            "  {:<7} [{}]  {}",
            m.property.label(),
            m.property.unit(),
            m.metrics.summary()
        );
    }
    if let Some(stacking) = &outcome.stacking {
        for (name, mse) in &stacking.base_learner_mse {
            println!("  base learner {name:<18} test MSE={mse:.4}");
        }
        println!("  linear baseline          test MSE={:.4}", stacking.linear_baseline_mse);
    }

    let written = session
        .export(&output_dir)
        .with_context(|| format!("exporting to {}", output_dir.display()))?;
    for path in &written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn run_init_config(output: &Path) -> Result<()> {
    RunConfig::default()
        .save_to_file(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(path = %output.display(), "Default configuration written");
    Ok(())
}

fn run_inspect(file: &Path) -> Result<()> {
    let table = ingest::load_path(file).with_context(|| format!("reading {}", file.display()))?;
    println!("{}: {} rows x {} columns", table.label, table.row_count(), table.column_count());
    for column in table.columns() {
        let present = (0..column.data.len()).filter(|&r| !column.data.is_missing(r)).count();
        println!("  {:<24} {:<12} {present} non-missing", column.name, column.data.kind());
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match &args.command {
        SubCommand::Predict {
            logs,
            core,
            config,
            axial_predictions,
            output_dir,
        } => run_predict(
            logs,
            core,
            config.as_deref(),
            axial_predictions.as_deref(),
            output_dir.as_deref(),
        ),
        SubCommand::InitConfig { output } => run_init_config(output),
        SubCommand::Inspect { file } => run_inspect(file),
    }
}
