//! CLI surface and tracing bootstrap.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
#[command(
    author,
    version,
    about = "http-test: run .http request files as test suites",
    long_about = "http-test executes the requests in a .http file in order,\n\
                  evaluates the assertion blocks attached to each request, and\n\
                  reports pass/fail results.\n\n\
                  Examples:\n  \
                  http-test suite.http\n  \
                  http-test suite.http --parallel --max-concurrency 8\n  \
                  http-test suite.http --var staging-vars.json --bail"
)]
pub struct Cli {
    /// The .http file to execute
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Increase logging verbosity and dump diagnostics at run end
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// JSON file with variables loaded into the environment scope
    #[arg(long, value_name = "PATH")]
    pub var: Option<PathBuf>,

    /// Execute independent requests concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Maximum number of in-flight requests in parallel mode
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Per-request timeout in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Stop on the first failed request or assertion
    #[arg(long)]
    pub bail: bool,

    /// Disable the response cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Directory containing the .env file used by {{$dotenv NAME}}
    #[arg(long, value_name = "DIR")]
    pub env_file: Option<PathBuf>,

    /// Skip TLS certificate verification (same as NODE_TLS_REJECT_UNAUTHORIZED=0)
    #[arg(long)]
    pub insecure: bool,

    /// Write the JSON report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// Installs the fmt subscriber. `--verbose` raises the crate level to
/// `debug`; `RUST_LOG` overrides everything.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "http_test=debug"
    } else {
        "http_test=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
