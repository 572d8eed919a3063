use std::fmt::Write;
use std::fs;
use std::path::Path;

use crate::error::VerifyError;
use crate::report::{Report, Stats};

/// Render the report as a self-contained Markdown document.
pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    let s = &report.summary;

    let _ = writeln!(out, "# Cross-Runner Consistency Report\n");
    let _ = writeln!(out, "**Generated**: {}\n", report.generated);

    let _ = writeln!(out, "## Overview\n");
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|--------|-------|");
    let _ = writeln!(out, "| Total tests | {} |", s.total_tests);
    let _ = writeln!(out, "| Consistent | {} ({:.1}%) |", s.total_passed, s.consistency_rate);
    let _ = writeln!(out, "| Inconsistent | {} |", s.total_failed);
    out.push('\n');

    stats_table(&mut out, "By Language", "Language", &report.by_language);
    stats_table(&mut out, "By Mode", "Mode", &report.by_mode);

    if !report.failures.is_empty() {
        let _ = writeln!(out, "## Failure Details\n");
        for detail in &report.failures {
            let _ = writeln!(out, "### {}\n", detail.test_name);
            for (runner, error) in &detail.failures {
                let _ = writeln!(out, "- **{runner}**: {error}");
            }
            out.push('\n');
        }
    }

    let _ = writeln!(out, "---\n");
    let _ = writeln!(out, "*Generated by parity-verify*");
    out
}

fn stats_table<'a>(
    out: &mut String,
    title: &str,
    column: &str,
    rows: impl IntoIterator<Item = (&'a String, &'a Stats)>,
) {
    let _ = writeln!(out, "## {title}\n");
    let _ = writeln!(out, "| {column} | Total | Passed | Failed | Pass rate |");
    let _ = writeln!(out, "|------|-------|--------|--------|-----------|");
    for (name, stats) in rows {
        let _ = writeln!(
            out,
            "| {name} | {} | {} | {} | {:.1}% |",
            stats.total,
            stats.passed,
            stats.failed,
            stats.pass_rate()
        );
    }
    out.push('\n');
}

pub fn write_json(path: &Path, report: &Report) -> Result<(), VerifyError> {
    write_file(path, &serde_json::to_vec_pretty(report)?)
}

pub fn write_markdown(path: &Path, report: &Report) -> Result<(), VerifyError> {
    write_file(path, render_markdown(report).as_bytes())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), VerifyError> {
    let write_err = |source| VerifyError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::report::{FailureDetail, ReportSummary};

    fn report() -> Report {
        Report {
            generated: "2026-01-01T00:00:00Z".into(),
            summary: ReportSummary {
                total_tests: 2,
                total_passed: 1,
                total_failed: 1,
                consistency_rate: 50.0,
            },
            by_language: BTreeMap::from([("go".to_string(), Stats { total: 4, passed: 3, failed: 1 })]),
            by_mode: BTreeMap::from([("api".to_string(), Stats { total: 4, passed: 3, failed: 1 })]),
            comparisons: Vec::new(),
            failures: vec![FailureDetail {
                test_name: "insert_dup".into(),
                failures: BTreeMap::from([("go_api".to_string(), "E11000 duplicate key".to_string())]),
            }],
        }
    }

    #[test]
    fn markdown_has_every_section() {
        let md = render_markdown(&report());
        assert!(md.contains("| Total tests | 2 |"));
        assert!(md.contains("| Consistent | 1 (50.0%) |"));
        assert!(md.contains("| go | 4 | 3 | 1 | 75.0% |"));
        assert!(md.contains("## By Mode"));
        assert!(md.contains("### insert_dup"));
        assert!(md.contains("- **go_api**: E11000 duplicate key"));
    }

    #[test]
    fn no_failure_section_when_consistent() {
        let mut r = report();
        r.failures.clear();
        assert!(!render_markdown(&r).contains("## Failure Details"));
    }
}
