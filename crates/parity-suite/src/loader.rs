use std::fs;
use std::path::Path;

use crate::case::TestSuite;
use crate::error::SuiteError;

/// Read and parse a suite file. Cases keep their file order.
pub fn load_suite(path: impl AsRef<Path>) -> Result<TestSuite, SuiteError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| SuiteError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| SuiteError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a suite from an in-memory JSON string.
pub fn parse_suite(json: &str) -> Result<TestSuite, SuiteError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"{
        "version": "1.0",
        "generated": "2025-01-01T00:00:00Z",
        "tests": [
            { "name": "b_first", "collection": "c", "setup": null,
              "action": { "method": "find" }, "expected": {} },
            { "name": "a_second", "collection": "c",
              "action": { "method": "listIndexes" } }
        ]
    }"#;

    #[test]
    fn cases_keep_file_order() {
        let suite = parse_suite(SUITE).unwrap();
        assert_eq!(suite.version, "1.0");
        let names: Vec<_> = suite.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b_first", "a_second"]);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_suite(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, SuiteError::Read { .. }));
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_suite(&path).unwrap_err();
        assert!(matches!(err, SuiteError::Parse { .. }));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.json");
        std::fs::write(&path, SUITE).unwrap();
        let suite = load_suite(&path).unwrap();
        assert_eq!(suite.tests.len(), 2);
    }
}
