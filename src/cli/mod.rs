// CLI module
// Command-line interface, argument parsing and log setup

mod args;

pub use args::CliArgs;

use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Parse command-line arguments using clap
///
/// If parsing fails (invalid arguments or `--help`), clap prints an error
/// or help text and exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

/// Install the global tracing subscriber
///
/// The filter comes from `LOYALTY_LOG` (default `info`). Logs go to stderr;
/// stdout carries the balance report.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("LOYALTY_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
