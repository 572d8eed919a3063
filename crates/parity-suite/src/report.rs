use std::fs;
use std::path::Path;

use crate::error::SuiteError;
use crate::outcome::ResultsFile;

/// Write a results file as pretty-printed JSON, creating parent
/// directories as needed.
pub fn write_results(path: impl AsRef<Path>, results: &ResultsFile) -> Result<(), SuiteError> {
    let path = path.as_ref();
    let write_err = |source| SuiteError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let json = serde_json::to_vec_pretty(results)?;
    fs::write(path, json).map_err(write_err)
}

pub fn read_results(path: impl AsRef<Path>) -> Result<ResultsFile, SuiteError> {
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
