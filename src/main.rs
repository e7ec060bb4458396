//! Loyalty Order Reconciler CLI
//!
//! Command-line interface for reconciling loyalty orders against the accrual system.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --state orders.csv submissions.csv > balances.csv
//! cargo run -- -r http://accrual:8081 --state orders.csv > balances.csv
//! LOYALTY_LOG=debug cargo run -- --workers 8 --retry-delay-ms 500 submissions.csv
//! ```
//!
//! The program restores the order snapshot, resumes every order that was not
//! settled, accepts the submissions from the input CSV file and polls the
//! accrual system until every order is settled or Ctrl-C is pressed. It then
//! rewrites the snapshot and prints the final balances to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (input file not readable, corrupt snapshot, etc.)

use loyalty_reconciler::cli;
use loyalty_reconciler::runner::Runner;
use std::process;

fn main() {
    let args = cli::parse_args();
    cli::init_tracing();

    // The balance report goes to stdout, logs to stderr
    let mut output = std::io::stdout();
    if let Err(e) = Runner::from_args(&args).run(&mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
