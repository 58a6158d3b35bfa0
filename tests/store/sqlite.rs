//! SqliteBackend tests — same contract as the memory backend, plus
//! durability across reopen.

use serde_json::json;

use dinesync::store::{SqliteBackend, StoreBackend};
use dinesync::{IndexValue, StoreError, StoreSchema, StoredRecord};

fn schemas() -> Vec<StoreSchema> {
    vec![
        StoreSchema::new("restaurants", "id")
            .index("isPosted")
            .bool_field("is_favorite"),
        StoreSchema::new("reviews", "id")
            .index("restaurant_id")
            .index("isPosted")
            .index("isOnServer")
            .index("shouldDelete"),
    ]
}

fn review_schema() -> StoreSchema {
    schemas().remove(1)
}

fn review(key: &str, restaurant_id: &str, posted: bool) -> StoredRecord {
    StoredRecord {
        key: key.to_string(),
        data: json!({"id": key, "restaurant_id": restaurant_id, "rating": 4}),
        is_on_server: posted,
        is_posted: posted,
        should_delete: false,
    }
}

#[test]
fn upsert_then_get_round_trips() {
    let backend = SqliteBackend::open_in_memory(&schemas()).unwrap();
    let schema = review_schema();
    let record = review("1", "42", true);

    backend.upsert(&schema, &[record.clone()]).unwrap();

    let loaded = backend.get_by_key(&schema, "1").unwrap().unwrap();
    assert_eq!(loaded, record);
    assert!(backend.get_by_key(&schema, "missing").unwrap().is_none());
}

#[test]
fn flag_queries_hit_the_flag_columns() {
    let backend = SqliteBackend::open_in_memory(&schemas()).unwrap();
    let schema = review_schema();
    let mut pending = review("2", "42", false);
    pending.should_delete = true;

    backend
        .upsert(&schema, &[review("1", "42", true), pending])
        .unwrap();

    let unposted = backend
        .get_by_index(&schema, "isPosted", &IndexValue::from(false))
        .unwrap();
    assert_eq!(unposted.len(), 1);
    assert_eq!(unposted[0].key, "2");

    let deletions = backend
        .get_by_index(&schema, "shouldDelete", &IndexValue::from(true))
        .unwrap();
    assert_eq!(deletions.len(), 1);
    assert_eq!(deletions[0].key, "2");
}

#[test]
fn payload_queries_go_through_json_extract() {
    let backend = SqliteBackend::open_in_memory(&schemas()).unwrap();
    let schema = review_schema();
    backend
        .upsert(
            &schema,
            &[
                review("1", "42", true),
                review("2", "42", true),
                review("3", "7", true),
            ],
        )
        .unwrap();

    let matched = backend
        .get_by_index(&schema, "restaurant_id", &IndexValue::from("42"))
        .unwrap();
    assert_eq!(matched.len(), 2);
}

#[test]
fn unknown_index_is_an_error() {
    let backend = SqliteBackend::open_in_memory(&schemas()).unwrap();
    let err = backend
        .get_by_index(&review_schema(), "rating", &IndexValue::from(4))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownIndex(_)));
}

#[test]
fn replace_key_is_atomic_and_leaves_one_record() {
    let backend = SqliteBackend::open_in_memory(&schemas()).unwrap();
    let schema = review_schema();
    backend
        .upsert(
            &schema,
            &[StoredRecord::new_local("UNPOSTED-abc", json!({"rating": 5}))],
        )
        .unwrap();

    let synced = StoredRecord::synced("7", json!({"id": "7", "rating": 5}));
    backend.replace_key(&schema, &synced, "UNPOSTED-abc").unwrap();

    assert!(backend.get_by_key(&schema, "UNPOSTED-abc").unwrap().is_none());
    assert!(backend.get_by_key(&schema, "7").unwrap().is_some());
    assert_eq!(backend.get_all(&schema).unwrap().len(), 1);
}

#[test]
fn retain_newest_evicts_oldest_by_date() {
    let backend = SqliteBackend::open_in_memory(&schemas()).unwrap();
    let schema = review_schema();
    let stamped = |key: &str, stamp: i64| StoredRecord::synced(
        key,
        json!({"id": key, "restaurant_id": "42", "updatedAt": stamp}),
    );
    backend
        .upsert(
            &schema,
            &[stamped("1", 100), stamped("2", 300), stamped("3", 200), stamped("4", 400)],
        )
        .unwrap();

    let purged = backend.retain_newest(&schema, "updatedAt", 2).unwrap();
    assert_eq!(purged, 2);

    let mut keys: Vec<String> = backend
        .get_all(&schema)
        .unwrap()
        .into_iter()
        .map(|r| r.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["2", "4"]);
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dinesync.db");
    let path = path.to_string_lossy();
    let schema = review_schema();

    {
        let backend = SqliteBackend::open(&path, &schemas()).unwrap();
        backend.upsert(&schema, &[review("1", "42", false)]).unwrap();
    }

    let backend = SqliteBackend::open(&path, &schemas()).unwrap();
    let loaded = backend.get_by_key(&schema, "1").unwrap().unwrap();
    assert_eq!(loaded.data["restaurant_id"], json!("42"));
    assert!(!loaded.is_posted);
}

#[test]
fn stores_share_one_table_without_mixing() {
    let backend = SqliteBackend::open_in_memory(&schemas()).unwrap();
    let reviews = review_schema();
    let restaurants = schemas().remove(0);

    backend.upsert(&reviews, &[review("1", "42", true)]).unwrap();
    backend
        .upsert(
            &restaurants,
            &[StoredRecord::synced("1", json!({"id": "1", "name": "A"}))],
        )
        .unwrap();

    assert_eq!(backend.get_all(&reviews).unwrap().len(), 1);
    assert_eq!(backend.get_all(&restaurants).unwrap().len(), 1);
    assert_eq!(
        backend.get_by_key(&restaurants, "1").unwrap().unwrap().data["name"],
        json!("A")
    );
}
