use std::path::PathBuf;

use clap::Parser;
use parity_suite::Mode;

/// Run a conformance suite against the database and write a results file.
#[derive(Debug, Clone, Parser)]
#[command(name = "parity-runner", version)]
pub struct RunnerArgs {
    /// How the database is reached.
    #[arg(long, value_enum, default_value_t = Mode::Api)]
    pub mode: Mode,

    /// Database fixture file. Deleted before the run.
    #[arg(long, default_value = "testdata/fixtures/test.monodb")]
    pub monodb: PathBuf,

    /// Suite file to execute.
    #[arg(long, default_value = "testdata/fixtures/testcases.json")]
    pub testcases: PathBuf,

    /// Where the results file is written.
    #[arg(long, default_value = "reports/rust_results.json")]
    pub output: PathBuf,

    /// Loopback port for the wire server.
    #[arg(long, default_value_t = 27021)]
    pub port: u16,
}
