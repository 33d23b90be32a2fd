//! Strata command-line interface.
//!
//! Run layered redistribution jobs from TOML configuration files:
//! ```sh
//! strata-cli run job.toml --output report.json
//! strata-cli validate job.toml
//! strata-cli plan job.toml
//! ```

mod config;
mod matrices;
mod mtx;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "strata-cli")]
#[command(about = "Strata: layered-grid redistribution and equilibration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gather, equilibrate and scatter on an in-process thread grid.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// JSON report path (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and load its matrix without running.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Print the per-layer counts each depth column would consolidate.
    Plan {
        /// Path to the job configuration file.
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Strata layered redistribution");
            println!("=============================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let report = runner::run_job(&job)?;
            runner::print_summary(&report);

            if let Some(path) = output.or_else(|| job.output.report.clone()) {
                runner::write_report(&report, &path)?;
            }
            if !report.round_trip {
                anyhow::bail!("Right-hand side did not survive the gather/scatter round trip");
            }
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let a = matrices::build_matrix(&job.matrix)?;
            println!(
                "Configuration is valid: {} ({} x {} matrix, {} processes)",
                config.display(),
                a.nrow(),
                a.ncol(),
                job.grid.nprocs()
            );
            Ok(())
        }
        Commands::Plan { config } => {
            let job = config::load_config(&config)?;
            let columns = runner::plan_job(&job)?;
            println!(
                "Layer plan for a {} x {} x {} grid:",
                job.grid.nprow, job.grid.npcol, job.grid.npdep
            );
            runner::print_columns(&columns);
            Ok(())
        }
    }
}
