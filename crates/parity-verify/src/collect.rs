use std::fs;
use std::path::Path;

use parity_suite::{Mode, ResultsFile, read_results};
use tracing::{info, warn};

use crate::error::VerifyError;

/// One runner's results, keyed by the `<language>_<mode>` file stem.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerResults {
    pub key: String,
    pub language: String,
    pub mode: Mode,
    pub file: ResultsFile,
}

/// Split `go_api` into `("go", Api)`. The language may itself contain
/// underscores; the mode is whatever follows the last one.
pub fn parse_key(stem: &str) -> Option<(&str, Mode)> {
    let (language, mode) = stem.rsplit_once('_')?;
    if language.is_empty() {
        return None;
    }
    Some((language, mode.parse().ok()?))
}

/// Load every `<language>_<mode>.json` file in `dir`, sorted by key.
///
/// Other files are ignored. Files that cannot be read or parsed are
/// skipped with a warning.
pub fn collect_results(dir: &Path) -> Result<Vec<RunnerResults>, VerifyError> {
    let entries = fs::read_dir(dir).map_err(|source| VerifyError::ResultsDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut runners = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((language, mode)) = parse_key(stem) else {
            continue;
        };

        match read_results(&path) {
            Ok(file) => {
                info!(key = stem, tests = file.results.len(), "loaded results");
                runners.push(RunnerResults {
                    key: stem.to_string(),
                    language: language.to_string(),
                    mode,
                    file,
                });
            }
            Err(e) => warn!(error = %e, "skipping results file"),
        }
    }

    runners.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(runners)
}
