use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// How a runner reaches the database.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// In-process calls into the database library.
    Api,
    /// Commands sent over the wire protocol to a loopback server.
    Wire,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Api => "api",
            Mode::Wire => "wire",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode: {0} (expected `api` or `wire`)")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Mode::Api),
            "wire" => Ok(Mode::Wire),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// The normalized record of one executed case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub test_name: String,
    pub language: String,
    pub mode: Mode,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Value>>,
}

impl Outcome {
    /// An empty, not-yet-successful outcome for `test_name`.
    pub fn new(test_name: impl Into<String>, language: impl Into<String>, mode: Mode) -> Self {
        Self {
            test_name: test_name.into(),
            language: language.into(),
            mode,
            success: false,
            error: None,
            duration_ms: 0,
            count: None,
            matched_count: None,
            modified_count: None,
            deleted_count: None,
            upserted_id: None,
            documents: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Always zero: there is no skip mechanism.
    #[serde(default)]
    pub skipped: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let passed = outcomes.iter().filter(|o| o.success).count();
        Self {
            total: outcomes.len(),
            passed,
            failed: outcomes.len() - passed,
            skipped: 0,
        }
    }
}

/// Everything one runner writes for one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    pub language: String,
    pub mode: Mode,
    #[serde(default)]
    pub results: Vec<Outcome>,
    #[serde(default)]
    pub summary: Summary,
}

impl ResultsFile {
    pub fn new(language: impl Into<String>, mode: Mode, results: Vec<Outcome>) -> Self {
        let summary = Summary::from_outcomes(&results);
        Self {
            language: language.into(),
            mode,
            results,
            summary,
        }
    }
}
