#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use parity_runner::RunnerArgs;
use parity_suite::{Mode, ResultsFile, read_results};
use tempfile::TempDir;

/// A suite touching every action method, setup step kind and error path.
pub const SUITE: &str = r#"{
  "version": "1.0",
  "generated": "2026-01-01T00:00:00Z",
  "tests": [
    {
      "name": "insert_one_basic",
      "collection": "users",
      "setup": null,
      "action": { "method": "insertOne", "doc": { "name": "alice", "age": 30 } },
      "expected": { "count": 1 }
    },
    {
      "name": "insert_many_three",
      "collection": "bulk",
      "action": { "method": "insertMany", "docs": [ { "n": 1 }, { "n": 2 }, { "n": 3 } ] },
      "expected": { "count": 3 }
    },
    {
      "name": "find_sorted_limited",
      "collection": "people",
      "setup": [
        { "operation": "insert", "data": { "name": "a", "age": 20 } },
        { "operation": "insert", "data": { "name": "b", "age": 35 } },
        { "operation": "insert", "data": { "name": "c", "age": 50 } }
      ],
      "action": {
        "method": "find",
        "filter": { "age": { "$gte": 30 } },
        "options": { "sort": { "age": -1 }, "limit": 1, "projection": { "name": 1, "_id": 0 } }
      },
      "expected": { "count": 1, "documents": [ { "name": "c" } ] }
    },
    {
      "name": "find_one_missing",
      "collection": "people",
      "action": { "method": "findOne", "filter": { "name": "zed" } },
      "expected": { "count": 0 }
    },
    {
      "name": "update_one_upsert",
      "collection": "counters",
      "action": {
        "method": "updateOne",
        "filter": { "key": "hits" },
        "update": { "$inc": { "value": 1 } },
        "options": { "upsert": true }
      }
    },
    {
      "name": "update_many_set",
      "collection": "flags",
      "setup": [
        { "operation": "insert", "data": { "on": false } },
        { "operation": "insert", "data": { "on": false } }
      ],
      "action": { "method": "updateMany", "filter": {}, "update": { "$set": { "on": true } } },
      "expected": { "matched_count": 2, "modified_count": 2 }
    },
    {
      "name": "replace_one_basic",
      "collection": "docs",
      "setup": [ { "operation": "insert", "data": { "_id": 1, "v": "old" } } ],
      "action": { "method": "replaceOne", "filter": { "_id": 1 }, "doc": { "v": "new" } }
    },
    {
      "name": "delete_many_by_value",
      "collection": "trash",
      "setup": [ { "operation": "insert", "data": { "x": 1 } } ],
      "action": { "method": "deleteMany", "filter": { "x": 1 } },
      "expected": { "deleted_count": 1 }
    },
    {
      "name": "delete_one_of_two",
      "collection": "pairs",
      "setup": [
        { "operation": "insert", "data": { "k": 1 } },
        { "operation": "insert", "data": { "k": 1 } }
      ],
      "action": { "method": "deleteOne", "filter": { "k": 1 } }
    },
    {
      "name": "find_and_modify_new",
      "collection": "jobs",
      "setup": [ { "operation": "insert", "data": { "job": "a", "state": "ready" } } ],
      "action": {
        "method": "findAndModify",
        "filter": { "state": "ready" },
        "update": { "$set": { "state": "running" } },
        "options": { "new": true }
      }
    },
    {
      "name": "distinct_tags",
      "collection": "posts",
      "setup": [
        { "operation": "insert", "data": { "tags": [ "a", "b" ] } },
        { "operation": "insert", "data": { "tags": [ "b", "c" ] } }
      ],
      "action": { "method": "distinct", "options": { "field": "tags" } }
    },
    {
      "name": "aggregate_group",
      "collection": "sales",
      "setup": [
        { "operation": "insert", "data": { "region": "east", "amount": 5 } },
        { "operation": "insert", "data": { "region": "west", "amount": 7 } },
        { "operation": "insert", "data": { "region": "east", "amount": 1 } }
      ],
      "action": {
        "method": "aggregate",
        "options": { "pipeline": [
          { "$group": { "_id": "$region", "total": { "$sum": "$amount" } } },
          { "$sort": { "_id": 1 } }
        ] }
      }
    },
    {
      "name": "create_index_default_name",
      "collection": "indexed",
      "action": { "method": "createIndex", "options": { "keys": { "a": 1, "b": -1 } } },
      "expected": { "index_name": "a_1_b_-1" }
    },
    {
      "name": "list_indexes_after_setup",
      "collection": "indexed2",
      "setup": [
        { "operation": "createIndex", "data": { "keys": { "email": 1 }, "options": { "unique": true } } }
      ],
      "action": { "method": "listIndexes" },
      "expected": { "count": 2 }
    },
    {
      "name": "drop_index_by_name",
      "collection": "indexed3",
      "setup": [
        { "operation": "createIndex", "data": { "keys": { "k": 1 }, "options": { "name": "by_k" } } }
      ],
      "action": { "method": "dropIndex", "options": { "name": "by_k" } }
    },
    {
      "name": "duplicate_id_expected",
      "collection": "dups",
      "setup": [ { "operation": "insert", "data": { "_id": 7 } } ],
      "action": { "method": "insertOne", "doc": { "_id": 7 } },
      "expected": { "error": "duplicate key" }
    },
    {
      "name": "setup_duplicate_expected",
      "collection": "setup_dups",
      "setup": [
        { "operation": "insert", "data": { "_id": 9 } },
        { "operation": "insert", "data": { "_id": 9 } }
      ],
      "action": { "method": "find", "filter": {} },
      "expected": { "error": "duplicate key" }
    },
    {
      "name": "list_indexes_never_written",
      "collection": "untouched",
      "action": { "method": "listIndexes" },
      "expected": { "count": 1 }
    },
    {
      "name": "unique_index_violation",
      "collection": "uniq",
      "setup": [
        { "operation": "createIndex", "data": { "keys": { "email": 1 }, "options": { "unique": true } } },
        { "operation": "insert", "data": { "email": "a@x" } }
      ],
      "action": { "method": "insertOne", "doc": { "email": "a@x" } }
    },
    {
      "name": "unrecognized_setup_step",
      "collection": "misc",
      "setup": [ { "operation": "truncate", "data": {} } ],
      "action": { "method": "find", "filter": {} }
    },
    {
      "name": "bogus_method",
      "collection": "misc",
      "action": { "method": "bogusMethod" }
    }
  ]
}"#;

/// A scratch directory holding the suite file, fixture and output paths.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(suite: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("testcases.json"), suite).unwrap();
        Self { dir }
    }

    pub fn args(&self, mode: Mode, output: &str) -> RunnerArgs {
        RunnerArgs {
            mode,
            monodb: self.dir.path().join("fixtures").join("test.monodb"),
            testcases: self.dir.path().join("testcases.json"),
            output: self.output(output),
            port: 0,
        }
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join("reports").join(name)
    }

    pub fn results(&self, name: &str) -> ResultsFile {
        read_results(self.output(name)).unwrap()
    }
}

pub fn outcome<'a>(file: &'a ResultsFile, name: &str) -> &'a parity_suite::Outcome {
    file.results
        .iter()
        .find(|o| o.test_name == name)
        .unwrap_or_else(|| panic!("no outcome named {name}"))
}
