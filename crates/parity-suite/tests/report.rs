use parity_suite::{Mode, Outcome, ResultsFile, Value, read_results, write_results};

fn outcome(name: &str, success: bool) -> Outcome {
    let mut o = Outcome::new(name, "rust", Mode::Api);
    o.success = success;
    o
}

#[test]
fn write_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports").join("nested").join("rust_api.json");

    let file = ResultsFile::new("rust", Mode::Api, vec![outcome("a", true)]);
    write_results(&path, &file).unwrap();

    assert!(path.exists());
}

#[test]
fn written_file_reads_back_with_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rust_api.json");

    let mut found = outcome("find_all", true);
    found.count = Some(1);
    found.documents = Some(vec![Value::Document(vec![(
        "_id".into(),
        Value::String("u1".into()),
    )])]);
    let mut failed = outcome("bogus", false);
    failed.error = Some("Unknown method: bogus".into());

    let file = ResultsFile::new("rust", Mode::Api, vec![found, failed]);
    write_results(&path, &file).unwrap();

    let back = read_results(&path).unwrap();
    assert_eq!(back, file);
    assert_eq!(back.summary.total, 2);
    assert_eq!(back.summary.passed, 1);
    assert_eq!(back.summary.failed, 1);
    assert_eq!(back.summary.skipped, 0);
}

#[test]
fn results_json_has_expected_top_level_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.json");
    write_results(&path, &ResultsFile::new("rust", Mode::Wire, vec![])).unwrap();

    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(json["language"], "rust");
    assert_eq!(json["mode"], "wire");
    assert_eq!(json["results"], serde_json::json!([]));
    assert_eq!(
        json["summary"],
        serde_json::json!({"total": 0, "passed": 0, "failed": 0, "skipped": 0})
    );
}
