use crate::engine::EngineConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Reconcile loyalty orders against the accrual system
#[derive(Parser, Debug)]
#[command(name = "loyalty-reconciler")]
#[command(about = "Reconcile loyalty orders against the accrual system", long_about = None)]
pub struct CliArgs {
    /// CSV file of new submissions with columns order,user
    #[arg(value_name = "INPUT", help = "Path to a CSV file of order submissions")]
    pub input_file: Option<PathBuf>,

    /// Base URL of the accrual system
    #[arg(
        short = 'r',
        long = "accrual-address",
        env = "ACCRUAL_SYSTEM_ADDRESS",
        value_name = "URL",
        default_value = "http://localhost:8081"
    )]
    pub accrual_address: String,

    /// Order snapshot loaded at startup and rewritten on exit
    #[arg(
        short = 'd',
        long = "state",
        env = "LOYALTY_STATE",
        value_name = "PATH",
        help = "Order snapshot CSV; created on first run"
    )]
    pub state_file: Option<PathBuf>,

    #[arg(
        long = "workers",
        env = "LOYALTY_WORKERS",
        value_name = "COUNT",
        help = "Maximum concurrent reconciliation tasks (default: 50)"
    )]
    pub workers: Option<usize>,

    #[arg(
        long = "retry-delay-ms",
        value_name = "MS",
        help = "Delay before re-polling an unsettled order (default: 300)"
    )]
    pub retry_delay_ms: Option<u64>,

    #[arg(
        long = "write-timeout-ms",
        value_name = "MS",
        help = "Deadline for each store write (default: 200)"
    )]
    pub write_timeout_ms: Option<u64>,

    #[arg(
        long = "startup-stagger-ms",
        value_name = "MS",
        help = "Spacing between orders resumed at startup (default: 200)"
    )]
    pub startup_stagger_ms: Option<u64>,

    /// Deadline for a single accrual system request
    #[arg(long = "request-timeout-ms", value_name = "MS", default_value_t = 5000)]
    pub request_timeout_ms: u64,

    /// Number of submissions read per batch
    #[arg(long = "batch-size", value_name = "SIZE", default_value_t = 1000)]
    pub batch_size: usize,
}

impl CliArgs {
    /// Create an EngineConfig from CLI arguments
    ///
    /// Options that were not given take their default; zero values are
    /// replaced with the default by `EngineConfig::new`.
    pub fn to_engine_config(&self) -> EngineConfig {
        let default = EngineConfig::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };

        EngineConfig::new(
            self.workers.unwrap_or(default.workers),
            millis(self.retry_delay_ms, default.retry_delay),
            millis(self.write_timeout_ms, default.write_timeout),
            millis(self.startup_stagger_ms, default.startup_stagger),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_no_arguments_needed() {
        let parsed = CliArgs::try_parse_from(["program"]).unwrap();

        assert_eq!(parsed.input_file, None);
        assert_eq!(parsed.state_file, None);
        assert_eq!(parsed.request_timeout(), Duration::from_secs(5));
        assert_eq!(parsed.batch_size, 1000);
    }

    #[rstest]
    #[case::short(&["program", "-r", "http://accrual:9000"], "http://accrual:9000")]
    #[case::long(&["program", "--accrual-address", "http://accrual:9000"], "http://accrual:9000")]
    fn test_accrual_address(#[case] args: &[&str], #[case] expected: &str) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.accrual_address, expected);
    }

    #[rstest]
    #[case::input_only(&["program", "orders.csv"], Some("orders.csv"), None)]
    #[case::state_only(&["program", "--state", "state.csv"], None, Some("state.csv"))]
    #[case::both(&["program", "-d", "state.csv", "orders.csv"], Some("orders.csv"), Some("state.csv"))]
    fn test_paths(
        #[case] args: &[&str],
        #[case] input: Option<&str>,
        #[case] state: Option<&str>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.input_file, input.map(PathBuf::from));
        assert_eq!(parsed.state_file, state.map(PathBuf::from));
    }

    #[rstest]
    #[case::all_defaults(&["program"], 50, 300, 200, 200)]
    #[case::workers(&["program", "--workers", "8"], 8, 300, 200, 200)]
    #[case::timings(
        &["program", "--retry-delay-ms", "1000", "--write-timeout-ms", "50", "--startup-stagger-ms", "0"],
        50,
        1000,
        50,
        0
    )]
    #[case::zero_workers_fallback(&["program", "--workers", "0"], 50, 300, 200, 200)]
    #[case::zero_retry_fallback(&["program", "--retry-delay-ms", "0"], 50, 300, 200, 200)]
    fn test_engine_config_conversion(
        #[case] args: &[&str],
        #[case] workers: usize,
        #[case] retry_ms: u64,
        #[case] write_ms: u64,
        #[case] stagger_ms: u64,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_engine_config();

        assert_eq!(config.workers, workers);
        assert_eq!(config.retry_delay, Duration::from_millis(retry_ms));
        assert_eq!(config.write_timeout, Duration::from_millis(write_ms));
        assert_eq!(config.startup_stagger, Duration::from_millis(stagger_ms));
    }

    #[rstest]
    #[case::negative_workers(&["program", "--workers", "-1"])]
    #[case::non_numeric_delay(&["program", "--retry-delay-ms", "soon"])]
    #[case::two_inputs(&["program", "a.csv", "b.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
