mod common;
use common::*;

use bson::doc;
use parity_engine::{DbError, ID_INDEX_NAME, IndexModel};

#[test]
fn create_index_returns_default_name() {
    let (db, _dir) = temp_db();
    let coll = db.collection(COLLECTION);
    let name = coll.create_index(IndexModel::new(doc! { "a": 1, "b": -1 })).unwrap();
    assert_eq!(name, "a_1_b_-1");

    let names: Vec<String> = coll
        .list_indexes()
        .unwrap()
        .iter()
        .map(|d| d.get_str("name").unwrap().to_string())
        .collect();
    assert_eq!(names, vec![ID_INDEX_NAME.to_string(), "a_1_b_-1".to_string()]);
}

#[test]
fn create_index_is_idempotent() {
    let (db, _dir) = temp_db();
    let coll = db.collection(COLLECTION);
    coll.create_index(IndexModel::new(doc! { "email": 1 })).unwrap();
    coll.create_index(IndexModel::new(doc! { "email": 1 })).unwrap();
    assert_eq!(coll.list_indexes().unwrap().len(), 2);
}

#[test]
fn conflicting_definitions_are_rejected() {
    let (db, _dir) = temp_db();
    let coll = db.collection(COLLECTION);
    coll.create_index(IndexModel::new(doc! { "email": 1 }).with_name("by_email")).unwrap();

    let same_name = coll.create_index(IndexModel::new(doc! { "phone": 1 }).with_name("by_email"));
    assert!(matches!(same_name, Err(DbError::IndexConflict(_))));

    let same_keys = coll.create_index(IndexModel::new(doc! { "email": 1 }).with_name("other"));
    assert!(matches!(same_keys, Err(DbError::IndexConflict(_))));
}

#[test]
fn unique_index_enforces_on_insert_and_update() {
    let (db, _dir) = temp_db();
    let coll = db.collection("users");
    coll.create_index(IndexModel::new(doc! { "email": 1 }).unique(true)).unwrap();
    coll.insert_one(doc! { "_id": 1, "email": "a@x" }).unwrap();
    coll.insert_one(doc! { "_id": 2, "email": "b@x" }).unwrap();

    let err = coll.insert_one(doc! { "_id": 3, "email": "a@x" }).unwrap_err();
    assert!(err.to_string().contains("index: email_1 dup key: { email: \"a@x\" }"));

    let err = coll
        .update_one(&doc! { "_id": 2 }, &doc! { "$set": { "email": "a@x" } }, false)
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey { .. }));
}

#[test]
fn unique_index_build_fails_on_existing_duplicates() {
    let (db, _dir) = temp_db();
    seed(&db, vec![doc! { "_id": 1, "k": 1 }, doc! { "_id": 2, "k": 1 }]);
    let err = db
        .collection(COLLECTION)
        .create_index(IndexModel::new(doc! { "k": 1 }).unique(true))
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey { .. }));
    assert_eq!(db.collection(COLLECTION).list_indexes().unwrap().len(), 1);
}

#[test]
fn drop_index_errors() {
    let (db, _dir) = temp_db();
    let coll = db.collection(COLLECTION);
    assert!(matches!(coll.drop_index("x_1"), Err(DbError::NamespaceNotFound(_))));
    assert!(matches!(coll.list_indexes(), Err(DbError::NamespaceNotFound(_))));

    coll.create_index(IndexModel::new(doc! { "x": 1 })).unwrap();
    let err = coll.drop_index("nope").unwrap_err();
    assert_eq!(err.to_string(), "index not found with name [nope]");
    assert!(coll.drop_index(ID_INDEX_NAME).is_err());

    coll.drop_index("x_1").unwrap();
    assert_eq!(coll.list_indexes().unwrap().len(), 1);
}

#[test]
fn ensure_creates_the_id_index_once() {
    let (db, _dir) = temp_db();
    let coll = db.collection("never_written");
    assert!(coll.ensure());
    assert_eq!(coll.list_indexes().unwrap().len(), 1);
    assert_eq!(coll.list_indexes().unwrap()[0].get_str("name").unwrap(), ID_INDEX_NAME);

    coll.create_index(IndexModel::new(doc! { "x": 1 })).unwrap();
    assert!(!coll.ensure());
    assert_eq!(coll.list_indexes().unwrap().len(), 2);
}
