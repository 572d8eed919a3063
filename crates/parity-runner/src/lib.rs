pub mod action;
pub mod config;
pub mod error;
pub mod executor;
pub mod transport;

pub use action::{Action, UpdateOptions};
pub use config::RunnerArgs;
pub use error::{ExecError, RunError};
pub use executor::{Executor, LANGUAGE};
pub use transport::{DirectTransport, Reply, Transport, TransportError, WireTransport};

use std::fs;
use std::io;
use std::path::Path;

use parity_suite::{Mode, Outcome, ResultsFile, Summary, TestSuite, load_suite, write_results};
use tracing::info;

/// Run the whole suite as configured and write the results file.
///
/// Case failures are recorded, not returned. Only problems with the suite
/// file, the fixture, the transport or the results file are errors.
pub fn run(args: &RunnerArgs) -> Result<Summary, RunError> {
    info!(mode = %args.mode, "starting parity runner");

    let suite = load_suite(&args.testcases)?;
    info!(tests = suite.tests.len(), path = %args.testcases.display(), "loaded suite");

    remove_fixture(&args.monodb)?;
    let open_err = |source| RunError::Open {
        mode: args.mode,
        source,
    };
    let outcomes = match args.mode {
        Mode::Api => run_suite(DirectTransport::open(&args.monodb).map_err(open_err)?, &suite)?,
        Mode::Wire => run_suite(
            WireTransport::open(&args.monodb, args.port).map_err(open_err)?,
            &suite,
        )?,
    };

    let results = ResultsFile::new(LANGUAGE, args.mode, outcomes);
    write_results(&args.output, &results)?;

    let s = results.summary;
    println!("passed: {}, failed: {}, total: {}", s.passed, s.failed, s.total);
    info!(path = %args.output.display(), "results written");
    Ok(s)
}

/// Execute every case in order over `transport`, printing one progress line
/// per case, then close the transport.
pub fn run_suite<T: Transport>(transport: T, suite: &TestSuite) -> Result<Vec<Outcome>, RunError> {
    let mut executor = Executor::new(transport);
    let total = suite.tests.len();
    let mut outcomes = Vec::with_capacity(total);

    for (i, case) in suite.tests.iter().enumerate() {
        let outcome = executor.execute(case);
        match (&outcome.error, outcome.success) {
            (Some(err), false) => println!(
                "[{}/{total}] {} ... FAILED: {err} ({}ms)",
                i + 1,
                case.name,
                outcome.duration_ms
            ),
            _ => println!("[{}/{total}] {} ... ok ({}ms)", i + 1, case.name, outcome.duration_ms),
        }
        outcomes.push(outcome);
    }

    executor.into_transport().close().map_err(RunError::Close)?;
    Ok(outcomes)
}

/// Each run starts from an empty database.
fn remove_fixture(path: &Path) -> Result<(), RunError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RunError::Fixture {
            path: path.to_path_buf(),
            source,
        }),
    }
}
