//! # Plansmith Command-Line Entry Point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load engine settings (JSON, defaults when absent)
//!   ├─> Initialise logging (stderr + rolling files)
//!   └─> Run the subcommand on a Tokio runtime
//! ```
//!
//! ```bash
//! plansmith infer data/employees.csv
//! plansmith generate --csv data/employees.csv --target sql \
//!     --request "average salary per department above 50000"
//! plansmith generate --config pipeline.yaml --request "orders per customer"
//! plansmith lineage --last 10
//! ```
//!
//! Generated source goes to stdout; logs go to stderr so the output can be
//! piped.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;
use plansmith::config::EngineConfig;
use plansmith::logging;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let settings = EngineConfig::load(&cli.settings_path()?)?;
    let log_dir = logging::get_log_dir(settings.log_dir.as_deref())?;
    logging::init(&log_dir)?;
    tracing::debug!(
        "Writing logs to {}",
        logging::current_log_path(&log_dir).display()
    );

    tokio::runtime::Runtime::new()?.block_on(cli::run_command(cli.command, settings))
}
