use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::collect::RunnerResults;

/// Cross-runner consistency report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// RFC 3339 timestamp.
    pub generated: String,
    pub summary: ReportSummary,
    pub by_language: BTreeMap<String, Stats>,
    pub by_mode: BTreeMap<String, Stats>,
    pub comparisons: Vec<Comparison>,
    pub failures: Vec<FailureDetail>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_tests: usize,
    /// Tests every runner passed.
    pub total_passed: usize,
    pub total_failed: usize,
    /// Percentage of tests every runner passed; 0 when there are none.
    pub consistency_rate: f64,
}

/// Pass/fail totals summed from runners' own summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Stats {
    pub fn pass_rate(&self) -> f64 {
        percent(self.passed, self.total)
    }
}

/// How each runner fared on one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub test_name: String,
    /// Runner key → success.
    pub results: BTreeMap<String, bool>,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub test_name: String,
    /// Runner key → error message.
    pub failures: BTreeMap<String, String>,
}

impl Report {
    /// Compare every test across `runners`. A test is consistent when no
    /// runner that reported it failed it.
    pub fn build(runners: &[RunnerResults], generated: impl Into<String>) -> Self {
        let mut by_test: BTreeMap<&str, BTreeMap<&str, (bool, Option<&str>)>> = BTreeMap::new();
        for runner in runners {
            for outcome in &runner.file.results {
                by_test
                    .entry(outcome.test_name.as_str())
                    .or_default()
                    .insert(runner.key.as_str(), (outcome.success, outcome.error.as_deref()));
            }
        }

        let mut comparisons = Vec::with_capacity(by_test.len());
        let mut failures = Vec::new();
        for (test_name, per_runner) in &by_test {
            let failed: BTreeMap<String, String> = per_runner
                .iter()
                .filter(|(_, (success, _))| !success)
                .map(|(key, (_, error))| (key.to_string(), error.unwrap_or_default().to_string()))
                .collect();
            let consistent = failed.is_empty();

            comparisons.push(Comparison {
                test_name: test_name.to_string(),
                results: per_runner
                    .iter()
                    .map(|(key, (success, _))| (key.to_string(), *success))
                    .collect(),
                consistent,
            });
            if !consistent {
                failures.push(FailureDetail {
                    test_name: test_name.to_string(),
                    failures: failed,
                });
            }
        }

        let mut by_language: BTreeMap<String, Stats> = BTreeMap::new();
        let mut by_mode: BTreeMap<String, Stats> = BTreeMap::new();
        for runner in runners {
            let s = runner.file.summary;
            for stats in [
                by_language.entry(runner.language.clone()).or_default(),
                by_mode.entry(runner.mode.to_string()).or_default(),
            ] {
                stats.total += s.total;
                stats.passed += s.passed;
                stats.failed += s.failed;
            }
        }

        let total_tests = comparisons.len();
        let total_passed = comparisons.iter().filter(|c| c.consistent).count();
        Self {
            generated: generated.into(),
            summary: ReportSummary {
                total_tests,
                total_passed,
                total_failed: total_tests - total_passed,
                consistency_rate: percent(total_passed, total_tests),
            },
            by_language,
            by_mode,
            comparisons,
            failures,
        }
    }

    /// Runner keys that appear anywhere in the report, sorted.
    pub fn runner_keys(&self) -> BTreeSet<&str> {
        self.comparisons
            .iter()
            .flat_map(|c| c.results.keys().map(String::as_str))
            .collect()
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}
