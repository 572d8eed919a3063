#![allow(dead_code)]

use bson::{Document, doc};
use parity_engine::Database;

pub const COLLECTION: &str = "accounts";

pub fn temp_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("test.monodb")).unwrap();
    (db, dir)
}

pub fn seed(db: &Database, docs: Vec<Document>) {
    db.collection(COLLECTION).insert_many(docs).unwrap();
}

pub fn accounts() -> Vec<Document> {
    vec![
        doc! { "_id": 1, "name": "Acme", "status": "active", "score": 10 },
        doc! { "_id": 2, "name": "Globex", "status": "inactive", "score": 25 },
        doc! { "_id": 3, "name": "Initech", "status": "active", "score": 5 },
    ]
}

pub fn ids(docs: &[Document]) -> Vec<i32> {
    docs.iter().map(|d| d.get_i32("_id").unwrap()).collect()
}
