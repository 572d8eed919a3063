use parity_runner::{Action, DirectTransport, Transport, TransportError, UpdateOptions, WireTransport};
use parity_engine::{FindOptions, IndexModel, doc};

#[test]
fn wire_transport_serves_on_loopback_and_persists_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wire.monodb");

    let mut wire = WireTransport::open(&path, 0).unwrap();
    assert!(wire.local_addr().ip().is_loopback());
    wire.execute("things", &Action::InsertOne { doc: doc! { "_id": 1, "v": "a" } })
        .unwrap();
    assert_eq!(wire.database().collection("things").count_documents(&doc! {}).unwrap(), 1);
    wire.close().unwrap();

    let direct = DirectTransport::open(&path).unwrap();
    let found = direct.database().collection("things").find_one(&doc! { "_id": 1 }).unwrap();
    assert_eq!(found, Some(doc! { "_id": 1, "v": "a" }));
}

#[test]
fn upsert_reports_zero_matched_on_both_transports() {
    let dir = tempfile::tempdir().unwrap();
    let action = Action::UpdateOne {
        filter: doc! { "k": "x" },
        update: doc! { "$set": { "v": 1 } },
        options: UpdateOptions { upsert: true },
    };

    let mut direct = DirectTransport::in_memory();
    let mut wire = WireTransport::open(dir.path().join("w.monodb"), 0).unwrap();
    let a = direct.execute("c", &action).unwrap();
    let b = wire.execute("c", &action).unwrap();

    assert_eq!(a.matched_count, Some(0));
    assert_eq!(b.matched_count, Some(0));
    assert!(a.upserted_id.is_some() && b.upserted_id.is_some());
    wire.close().unwrap();
}

#[test]
fn engine_errors_pass_through_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut direct = DirectTransport::in_memory();
    let mut wire = WireTransport::open(dir.path().join("w.monodb"), 0).unwrap();

    for t in [&mut direct as &mut dyn Transport, &mut wire] {
        t.execute("ix", &Action::CreateIndex { model: IndexModel::new(doc! { "a": 1 }) })
            .unwrap();
        let err = t
            .execute("ix", &Action::DropIndex { name: "missing_1".into() })
            .unwrap_err();
        assert_eq!(err.to_string(), "index not found with name [missing_1]");

        let err = t
            .execute("ix", &Action::Find { filter: doc! { "a": { "$bogus": 1 } }, options: FindOptions::default() })
            .unwrap_err();
        assert!(err.to_string().contains("unknown operator: $bogus"), "{err}");
    }
    wire.close().unwrap();
}

#[test]
fn actions_on_a_never_written_collection_see_the_id_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut direct = DirectTransport::in_memory();
    let mut wire = WireTransport::open(dir.path().join("w.monodb"), 0).unwrap();

    for t in [&mut direct as &mut dyn Transport, &mut wire] {
        let reply = t.execute("never_written", &Action::ListIndexes).unwrap();
        assert_eq!(reply.count, Some(1), "{:?}", t.mode());

        let err = t
            .execute("also_never_written", &Action::DropIndex { name: "missing_1".into() })
            .unwrap_err();
        assert_eq!(err.to_string(), "index not found with name [missing_1]");
    }
    wire.close().unwrap();
}

#[test]
fn write_errors_carry_the_server_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut wire = WireTransport::open(dir.path().join("w.monodb"), 0).unwrap();
    let insert = Action::InsertOne { doc: doc! { "_id": 1 } };
    wire.execute("users", &insert).unwrap();

    let err = wire.execute("users", &insert).unwrap_err();
    assert!(matches!(err, TransportError::Server { code: 11000, .. }), "{err:?}");
    assert!(err.to_string().starts_with("E11000 duplicate key error collection: test.users"), "{err}");
    wire.close().unwrap();
}
