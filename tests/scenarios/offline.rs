//! End-to-end offline scenarios through the `Directory` session object.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use dinesync::remote::{FetchTarget, MutationRequest, RemoteTransport, ResourceRoute};
use dinesync::store::{MemoryBackend, Store};
use dinesync::sync::{RetryScheduler, RetrySchedulerOptions};
use dinesync::{Directory, Origin, RecordState, RemoteError, StoreSchema};

/// Server stand-in: offline by default, can come back up mid-test. While
/// up, creates are acked with sequential ids.
struct FlakyServer {
    online: Mutex<bool>,
    next_id: Mutex<i64>,
    deletes: Mutex<Vec<String>>,
}

impl FlakyServer {
    fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: Mutex::new(online),
            next_id: Mutex::new(7),
            deletes: Mutex::new(Vec::new()),
        })
    }

    fn set_online(&self, online: bool) {
        *self.online.lock() = online;
    }

    fn check(&self) -> Result<(), RemoteError> {
        if *self.online.lock() {
            Ok(())
        } else {
            Err(RemoteError::Unreachable("connection refused".into()))
        }
    }

    fn deletes(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }
}

#[async_trait]
impl RemoteTransport for FlakyServer {
    async fn fetch(
        &self,
        _route: &ResourceRoute,
        _target: &FetchTarget,
    ) -> Result<Vec<Value>, RemoteError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn submit(
        &self,
        _route: &ResourceRoute,
        request: &MutationRequest,
    ) -> Result<Option<Value>, RemoteError> {
        self.check()?;
        match request {
            MutationRequest::Create { data, .. } => {
                let mut echo = data.clone();
                let id = {
                    let mut next = self.next_id.lock();
                    let id = *next;
                    *next += 1;
                    id
                };
                echo["id"] = json!(id);
                Ok(Some(echo))
            }
            MutationRequest::UpdateQuery { key, field, value } => {
                let mut echo = json!({"id": key});
                echo[field.as_str()] = json!(value);
                Ok(Some(echo))
            }
            MutationRequest::Update { key, data } => {
                let mut echo = data.clone();
                echo["id"] = json!(key);
                Ok(Some(echo))
            }
            MutationRequest::Delete { key } => {
                self.deletes.lock().push(key.clone());
                Ok(None)
            }
        }
    }
}

fn memory_store() -> Store {
    Store::new(Arc::new(MemoryBackend::new()))
}

fn restaurant_schema() -> StoreSchema {
    StoreSchema::new("restaurants", "id")
        .index("isPosted")
        .bool_field("is_favorite")
}

fn review_schema() -> StoreSchema {
    StoreSchema::new("reviews", "id")
        .index("restaurant_id")
        .index("isPosted")
        .index("isOnServer")
        .index("shouldDelete")
}

fn directory_with(server: Arc<FlakyServer>, store: Store) -> Directory {
    Directory::with_transport(store, server, None)
}

fn tick_scheduler(directory: &Directory) -> Arc<RetryScheduler> {
    RetryScheduler::new(
        vec![directory.restaurants().clone(), directory.reviews().clone()],
        RetrySchedulerOptions::default(),
    )
}

#[tokio::test]
async fn offline_favorite_toggle_lands_locally() {
    let server = FlakyServer::new(false);
    let store = memory_store();
    let directory = directory_with(server, store.clone());

    let outcome = directory.update_favorite("42", true).await.unwrap();

    assert_eq!(outcome.origin, Origin::Local);
    let record = store.get(&restaurant_schema(), "42").unwrap();
    assert_eq!(record.data["id"], json!("42"));
    assert_eq!(record.data["is_favorite"], json!(1));
    assert!(!record.is_posted);
}

#[tokio::test]
async fn offline_review_reaches_the_server_after_reconnect() {
    let server = FlakyServer::new(false);
    let store = memory_store();
    let directory = directory_with(server.clone(), store.clone());

    let outcome = directory
        .create_review("42", json!({"name": "A", "rating": 5}))
        .await
        .unwrap();
    assert_eq!(outcome.origin, Origin::Local);
    let local_key = outcome.record.unwrap().key;
    assert!(local_key.starts_with("UNPOSTED-"));

    // still offline: the tick changes nothing
    let scheduler = tick_scheduler(&directory);
    scheduler.tick().await;
    assert!(store.get(&review_schema(), &local_key).is_some());

    // reconnect: the next tick converges
    server.set_online(true);
    scheduler.tick().await;

    assert!(store.get(&review_schema(), &local_key).is_none());
    let record = store.get(&review_schema(), "7").unwrap();
    assert_eq!(record.state(), RecordState::Synced);
    assert_eq!(record.data["name"], json!("A"));
    assert_eq!(record.data["restaurant_id"], json!("42"));
}

#[tokio::test]
async fn editing_an_unsent_review_replays_as_a_create() {
    let server = FlakyServer::new(false);
    let store = memory_store();
    let directory = directory_with(server.clone(), store.clone());

    let created = directory
        .create_review("42", json!({"name": "A", "rating": 3}))
        .await
        .unwrap();
    let local_key = created.record.unwrap().key;

    server.set_online(true);
    let outcome = directory
        .update_review(&local_key, json!({"name": "A", "rating": 5}))
        .await
        .unwrap();

    assert_eq!(outcome.origin, Origin::Network);
    assert_eq!(outcome.record.unwrap().key, "7");
    assert!(store.get(&review_schema(), &local_key).is_none());
    assert_eq!(
        store.get(&review_schema(), "7").unwrap().data["rating"],
        json!(5)
    );
}

#[tokio::test]
async fn editing_an_unsent_review_keeps_its_restaurant_linkage() {
    let server = FlakyServer::new(false);
    let store = memory_store();
    let directory = directory_with(server.clone(), store.clone());

    let created = directory
        .create_review("42", json!({"name": "A", "rating": 3}))
        .await
        .unwrap();
    let local_key = created.record.unwrap().key;

    // still offline: the edit merges over the stored copy
    let outcome = directory
        .update_review(&local_key, json!({"name": "A", "rating": 5}))
        .await
        .unwrap();
    assert_eq!(outcome.origin, Origin::Local);

    let record = store.get(&review_schema(), &local_key).unwrap();
    assert_eq!(record.data["restaurant_id"], json!("42"));
    assert_eq!(record.data["rating"], json!(5));
    assert!(record.data.get("createdAt").is_some());

    // and the replayed create carries the linkage to the server
    server.set_online(true);
    tick_scheduler(&directory).tick().await;
    let synced = store.get(&review_schema(), "7").unwrap();
    assert_eq!(synced.data["restaurant_id"], json!("42"));
    assert_eq!(synced.data["rating"], json!(5));
}

#[tokio::test]
async fn offline_delete_of_an_unsent_review_never_reaches_the_server() {
    let server = FlakyServer::new(false);
    let store = memory_store();
    let directory = directory_with(server.clone(), store.clone());

    let created = directory
        .create_review("42", json!({"name": "A", "rating": 5}))
        .await
        .unwrap();
    let local_key = created.record.unwrap().key;

    let outcome = directory.delete_review(&local_key).await.unwrap();
    assert_eq!(outcome.origin, Origin::Local);
    assert!(store.get(&review_schema(), &local_key).unwrap().should_delete);

    // reconnecting purges it locally; the server never sees a DELETE
    server.set_online(true);
    tick_scheduler(&directory).tick().await;

    assert!(store.get(&review_schema(), &local_key).is_none());
    assert!(server.deletes().is_empty());
}

#[tokio::test]
async fn pending_deletes_are_hidden_from_reads() {
    let server = FlakyServer::new(false);
    let store = memory_store();
    let directory = directory_with(server, store.clone());

    let created = directory
        .create_review("42", json!({"name": "A", "rating": 5}))
        .await
        .unwrap();
    let local_key = created.record.unwrap().key;
    directory.delete_review(&local_key).await.unwrap();

    let local: Arc<Mutex<Option<Vec<dinesync::StoredRecord>>>> = Arc::new(Mutex::new(None));
    let slot = local.clone();
    directory
        .fetch_reviews_for_restaurant(
            "42",
            move |result| *slot.lock() = Some(result.unwrap()),
            |_| {},
        )
        .await;

    assert!(local.lock().take().unwrap().is_empty());
}

#[tokio::test]
async fn review_store_retention_is_enforced_on_write() {
    let server = FlakyServer::new(false);
    let store = memory_store();
    let directory = Directory::with_transport(store.clone(), server, Some(2));
    let bounded_schema = StoreSchema::new("reviews", "id").retain("updatedAt", 2);

    for i in 0..4 {
        directory
            .create_review("42", json!({"name": format!("r{i}"), "rating": i}))
            .await
            .unwrap();
    }

    assert!(store.all(&bounded_schema).len() <= 2);
}

#[tokio::test]
async fn degraded_store_still_answers_from_the_network() {
    let server = FlakyServer::new(true);
    let directory = directory_with(server, Store::degraded());

    let local_fired = Arc::new(Mutex::new(false));
    let network_fired = Arc::new(Mutex::new(false));
    let local_flag = local_fired.clone();
    let network_flag = network_fired.clone();

    directory
        .fetch_restaurants(
            move |_| *local_flag.lock() = true,
            move |result| *network_flag.lock() = result.is_ok(),
        )
        .await;

    assert!(!*local_fired.lock());
    assert!(*network_fired.lock());
}

#[tokio::test]
async fn degraded_store_surfaces_write_failures() {
    let server = FlakyServer::new(false);
    let directory = directory_with(server, Store::degraded());

    let err = directory.update_favorite("42", true).await.unwrap_err();
    assert_eq!(err.origin, Origin::Network);
}
