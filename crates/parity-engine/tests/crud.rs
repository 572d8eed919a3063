mod common;
use common::*;

use bson::{Bson, doc};
use parity_engine::{DbError, FindAndModifyOptions, FindOptions};

// ── Insert ──────────────────────────────────────────────────────

#[test]
fn insert_assigns_object_id() {
    let (db, _dir) = temp_db();
    let result = db.collection(COLLECTION).insert_one(doc! { "name": "a" }).unwrap();
    assert!(matches!(result.inserted_id, Bson::ObjectId(_)));

    let found = db.collection(COLLECTION).find_one(&doc! {}).unwrap().unwrap();
    assert_eq!(found.get("_id"), Some(&result.inserted_id));
}

#[test]
fn duplicate_id_is_rejected() {
    let (db, _dir) = temp_db();
    let coll = db.collection("users");
    coll.insert_one(doc! { "_id": 1 }).unwrap();
    let err = coll.insert_one(doc! { "_id": 1 }).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey { .. }));
    assert_eq!(
        err.to_string(),
        "E11000 duplicate key error collection: test.users index: _id_ dup key: { _id: 1 }"
    );
}

#[test]
fn insert_many_stops_at_first_failure() {
    let (db, _dir) = temp_db();
    let coll = db.collection(COLLECTION);
    let err = coll
        .insert_many(vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }])
        .unwrap_err();
    assert!(err.to_string().contains("duplicate key"));
    assert_eq!(coll.count_documents(&doc! {}).unwrap(), 1);
}

// ── Find ────────────────────────────────────────────────────────

#[test]
fn find_with_sort_skip_limit_projection() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let options = FindOptions {
        sort: Some(doc! { "score": -1 }),
        skip: 1,
        limit: 1,
        projection: Some(doc! { "name": 1 }),
    };
    let docs = db.collection(COLLECTION).find(&doc! {}, &options).unwrap();
    assert_eq!(docs, vec![doc! { "_id": 1, "name": "Acme" }]);
}

#[test]
fn negative_limit_uses_absolute_value() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let options = FindOptions {
        limit: -2,
        ..Default::default()
    };
    assert_eq!(db.collection(COLLECTION).find(&doc! {}, &options).unwrap().len(), 2);
}

#[test]
fn find_on_missing_collection_is_empty() {
    let (db, _dir) = temp_db();
    let docs = db.collection("nope").find(&doc! {}, &FindOptions::default()).unwrap();
    assert!(docs.is_empty());
    assert!(db.list_collection_names().is_empty());
}

#[test]
fn bad_filter_is_an_error() {
    let (db, _dir) = temp_db();
    let err = db
        .collection(COLLECTION)
        .find(&doc! { "a": { "$bogus": 1 } }, &FindOptions::default())
        .unwrap_err();
    assert!(matches!(err, DbError::BadValue(_)));
}

#[test]
fn distinct_unwinds_arrays() {
    let (db, _dir) = temp_db();
    seed(
        &db,
        vec![
            doc! { "_id": 1, "tags": ["a", "b"] },
            doc! { "_id": 2, "tags": "b" },
            doc! { "_id": 3, "tags": ["c"] },
        ],
    );
    let values = db.collection(COLLECTION).distinct("tags", &doc! {}).unwrap();
    assert_eq!(values, vec![Bson::from("a"), Bson::from("b"), Bson::from("c")]);
}

// ── Update ──────────────────────────────────────────────────────

#[test]
fn update_one_counts() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let coll = db.collection(COLLECTION);

    let result = coll
        .update_one(&doc! { "status": "active" }, &doc! { "$set": { "status": "gone" } }, false)
        .unwrap();
    assert_eq!((result.matched, result.modified), (1, 1));
    assert_eq!(result.upserted_id, None);

    let result = coll
        .update_one(&doc! { "_id": 2 }, &doc! { "$set": { "status": "inactive" } }, false)
        .unwrap();
    assert_eq!((result.matched, result.modified), (1, 0));
}

#[test]
fn update_many_touches_every_match() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let result = db
        .collection(COLLECTION)
        .update_many(&doc! { "score": { "$lt": 20 } }, &doc! { "$inc": { "score": 1 } }, false)
        .unwrap();
    assert_eq!((result.matched, result.modified), (2, 2));
    let found = db.collection(COLLECTION).find_one(&doc! { "_id": 3 }).unwrap().unwrap();
    assert_eq!(found.get_i32("score").unwrap(), 6);
}

#[test]
fn upsert_inserts_seeded_document() {
    let (db, _dir) = temp_db();
    let coll = db.collection(COLLECTION);
    let result = coll
        .update_one(&doc! { "name": "Hooli" }, &doc! { "$set": { "score": 1 } }, true)
        .unwrap();
    assert_eq!((result.matched, result.modified), (0, 0));
    let id = result.upserted_id.unwrap();

    let found = coll.find_one(&doc! { "_id": id }).unwrap().unwrap();
    assert_eq!(found.get_str("name").unwrap(), "Hooli");
    assert_eq!(found.get_i32("score").unwrap(), 1);
}

#[test]
fn replace_one_keeps_id() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let coll = db.collection(COLLECTION);
    let result = coll.replace_one(&doc! { "_id": 1 }, &doc! { "name": "New" }, false).unwrap();
    assert_eq!((result.matched, result.modified), (1, 1));
    assert_eq!(coll.find_one(&doc! { "_id": 1 }).unwrap().unwrap(), doc! { "_id": 1, "name": "New" });

    assert!(coll.replace_one(&doc! { "_id": 1 }, &doc! { "$set": { "a": 1 } }, false).is_err());
}

#[test]
fn update_on_missing_collection_does_not_create_it() {
    let (db, _dir) = temp_db();
    let result = db
        .collection("ghost")
        .update_many(&doc! {}, &doc! { "$set": { "a": 1 } }, false)
        .unwrap();
    assert_eq!(result.matched, 0);
    assert!(db.list_collection_names().is_empty());
}

// ── Delete ──────────────────────────────────────────────────────

#[test]
fn delete_one_and_many() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let coll = db.collection(COLLECTION);
    assert_eq!(coll.delete_one(&doc! { "status": "active" }).unwrap().deleted, 1);
    assert_eq!(coll.delete_many(&doc! {}).unwrap().deleted, 2);
    assert_eq!(coll.count_documents(&doc! {}).unwrap(), 0);
}

// ── Find and modify ─────────────────────────────────────────────

#[test]
fn find_and_modify_returns_pre_or_post_image() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let coll = db.collection(COLLECTION);

    let options = FindAndModifyOptions {
        sort: Some(doc! { "score": 1 }),
        update: Some(doc! { "$inc": { "score": 100 } }),
        ..Default::default()
    };
    let before = coll.find_and_modify(&doc! {}, &options).unwrap().unwrap();
    assert_eq!(before.get_i32("_id").unwrap(), 3);
    assert_eq!(before.get_i32("score").unwrap(), 5);

    let options = FindAndModifyOptions { new: true, ..options };
    let after = coll.find_and_modify(&doc! { "_id": 1 }, &options).unwrap().unwrap();
    assert_eq!(after.get_i32("score").unwrap(), 110);
}

#[test]
fn find_and_modify_remove_and_upsert() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let coll = db.collection(COLLECTION);

    let removed = coll
        .find_and_modify(&doc! { "_id": 2 }, &FindAndModifyOptions { remove: true, ..Default::default() })
        .unwrap();
    assert_eq!(removed.unwrap().get_str("name").unwrap(), "Globex");
    assert_eq!(coll.count_documents(&doc! {}).unwrap(), 2);

    let upserted = coll
        .find_and_modify(
            &doc! { "_id": 9 },
            &FindAndModifyOptions {
                update: Some(doc! { "$set": { "name": "Umbrella" } }),
                upsert: true,
                new: true,
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(upserted, doc! { "_id": 9, "name": "Umbrella" });

    let missing = coll
        .find_and_modify(
            &doc! { "_id": 42 },
            &FindAndModifyOptions { update: Some(doc! { "$set": { "x": 1 } }), ..Default::default() },
        )
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn find_and_modify_rejects_conflicting_options() {
    let (db, _dir) = temp_db();
    let coll = db.collection(COLLECTION);
    assert!(coll.find_and_modify(&doc! {}, &FindAndModifyOptions::default()).is_err());
    let both = FindAndModifyOptions {
        remove: true,
        update: Some(doc! { "$set": { "a": 1 } }),
        ..Default::default()
    };
    assert!(coll.find_and_modify(&doc! {}, &both).is_err());
}

// ── Aggregate ───────────────────────────────────────────────────

#[test]
fn aggregate_groups_by_field() {
    let (db, _dir) = temp_db();
    seed(&db, accounts());
    let out = db
        .collection(COLLECTION)
        .aggregate(&[
            doc! { "$group": { "_id": "$status", "total": { "$sum": "$score" } } },
            doc! { "$sort": { "_id": 1 } },
        ])
        .unwrap();
    assert_eq!(
        out,
        vec![doc! { "_id": "active", "total": 15 }, doc! { "_id": "inactive", "total": 25 }]
    );
    assert_eq!(ids(&db.collection(COLLECTION).aggregate(&[doc! { "$match": { "score": { "$gt": 6 } } }]).unwrap()), vec![1, 2]);
}
