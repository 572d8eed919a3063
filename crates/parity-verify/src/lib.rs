pub mod collect;
pub mod config;
pub mod error;
pub mod render;
pub mod report;

pub use collect::{RunnerResults, collect_results, parse_key};
pub use config::VerifyArgs;
pub use error::VerifyError;
pub use render::{render_markdown, write_json, write_markdown};
pub use report::{Comparison, FailureDetail, Report, ReportSummary, Stats};

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

/// Collect results, build the report and write both renderings.
pub fn verify(args: &VerifyArgs) -> Result<Report, VerifyError> {
    let runners = collect_results(&args.results_dir)?;
    if runners.is_empty() {
        warn!(dir = %args.results_dir.display(), "no results files found");
    }

    let report = Report::build(&runners, Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    write_json(&args.output_json, &report)?;
    info!(path = %args.output_json.display(), "JSON report written");
    write_markdown(&args.output_md, &report)?;
    info!(path = %args.output_md.display(), "Markdown report written");

    let s = &report.summary;
    println!(
        "tests: {}, consistent: {}, inconsistent: {}, consistency rate: {:.1}%",
        s.total_tests, s.total_passed, s.total_failed, s.consistency_rate
    );
    Ok(report)
}
