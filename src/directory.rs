//! Directory — the session object tying the restaurant and review engines
//! to their stores and REST routes.
//!
//! One `Directory` per application session. It owns the persistence handle,
//! the transport, and both engines; UI collaborators call its operations and
//! render whatever comes back.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::error::Result;
use crate::remote::{FetchTarget, MutationRequest, RemoteTransport, ResourceRoute, RestTransport};
use crate::store::{MemoryBackend, Store};
use crate::sync::{
    MutationOutcome, RetryScheduler, RetrySchedulerOptions, SubmitError, SubmitOptions,
    SyncEngine, UpdateStyle,
};
use crate::types::{is_synthetic_key, StoreSchema, StoredRecord};

pub struct DirectoryOptions {
    /// API base, e.g. `http://localhost:1337`.
    pub base_url: String,
    /// Path to the SQLite database. `None` keeps records in memory only.
    pub db_path: Option<std::path::PathBuf>,
    /// Bound the review store to this many newest-by-`updatedAt` records.
    pub review_limit: Option<usize>,
}

impl DirectoryOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            db_path: None,
            review_limit: None,
        }
    }
}

pub struct Directory {
    restaurants: Arc<SyncEngine>,
    reviews: Arc<SyncEngine>,
}

fn restaurant_schema() -> StoreSchema {
    StoreSchema::new("restaurants", "id")
        .index("isPosted")
        .bool_field("is_favorite")
}

fn review_schema(limit: Option<usize>) -> StoreSchema {
    let schema = StoreSchema::new("reviews", "id")
        .index("restaurant_id")
        .index("isPosted")
        .index("isOnServer")
        .index("shouldDelete");
    match limit {
        Some(limit) => schema.retain("updatedAt", limit),
        None => schema,
    }
}

fn millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

impl Directory {
    pub fn open(options: DirectoryOptions) -> Result<Self> {
        let store = Self::open_store(&options);
        let transport = Arc::new(RestTransport::new(options.base_url)?);
        Ok(Self::with_transport(store, transport, options.review_limit))
    }

    /// Wire the engines over an arbitrary store and transport. Tests use
    /// this with mock transports.
    pub fn with_transport(
        store: Store,
        transport: Arc<dyn RemoteTransport>,
        review_limit: Option<usize>,
    ) -> Self {
        let restaurants = Arc::new(SyncEngine::new(
            restaurant_schema(),
            ResourceRoute::new("restaurants"),
            store.clone(),
            transport.clone(),
            UpdateStyle::QueryParam {
                field: "is_favorite".to_string(),
            },
        ));
        let reviews = Arc::new(SyncEngine::new(
            review_schema(review_limit),
            ResourceRoute::new("reviews"),
            store,
            transport,
            UpdateStyle::Body,
        ));
        Self {
            restaurants,
            reviews,
        }
    }

    fn open_store(options: &DirectoryOptions) -> Store {
        let schemas = [
            restaurant_schema(),
            review_schema(options.review_limit),
        ];
        match &options.db_path {
            None => Store::new(Arc::new(MemoryBackend::new())),
            Some(path) => Self::open_sqlite(path, &schemas),
        }
    }

    #[cfg(feature = "sqlite")]
    fn open_sqlite(path: &std::path::Path, schemas: &[StoreSchema]) -> Store {
        match crate::store::SqliteBackend::open(&path.to_string_lossy(), schemas) {
            Ok(backend) => Store::new(Arc::new(backend)),
            Err(e) => {
                log::warn!("persistence unavailable, running network-only: {e}");
                Store::degraded()
            }
        }
    }

    #[cfg(not(feature = "sqlite"))]
    fn open_sqlite(_path: &std::path::Path, _schemas: &[StoreSchema]) -> Store {
        log::warn!("built without sqlite support, keeping records in memory");
        Store::new(Arc::new(MemoryBackend::new()))
    }

    pub fn restaurants(&self) -> &Arc<SyncEngine> {
        &self.restaurants
    }

    pub fn reviews(&self) -> &Arc<SyncEngine> {
        &self.reviews
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn fetch_restaurants<L, N>(&self, on_local: L, on_network: N)
    where
        L: FnOnce(Result<Vec<StoredRecord>>),
        N: FnOnce(Result<Vec<StoredRecord>>),
    {
        self.restaurants
            .fetch(FetchTarget::All, on_local, on_network)
            .await;
    }

    pub async fn fetch_restaurant_by_id<L, N>(&self, id: &str, on_local: L, on_network: N)
    where
        L: FnOnce(Result<Vec<StoredRecord>>),
        N: FnOnce(Result<Vec<StoredRecord>>),
    {
        self.restaurants
            .fetch(FetchTarget::ById(id.to_string()), on_local, on_network)
            .await;
    }

    pub async fn fetch_reviews_for_restaurant<L, N>(
        &self,
        restaurant_id: &str,
        on_local: L,
        on_network: N,
    ) where
        L: FnOnce(Result<Vec<StoredRecord>>),
        N: FnOnce(Result<Vec<StoredRecord>>),
    {
        let target = FetchTarget::ByIndex {
            field: "restaurant_id".to_string(),
            value: restaurant_id.to_string(),
        };
        self.reviews.fetch(target, on_local, on_network).await;
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn update_favorite(
        &self,
        id: &str,
        favorite: bool,
    ) -> std::result::Result<MutationOutcome, SubmitError> {
        let request = MutationRequest::UpdateQuery {
            key: id.to_string(),
            field: "is_favorite".to_string(),
            value: favorite,
        };
        self.restaurants
            .submit(request, SubmitOptions::default())
            .await
    }

    /// Create a review, stamping `restaurant_id` and creation timestamps.
    pub async fn create_review(
        &self,
        restaurant_id: &str,
        mut payload: Value,
    ) -> std::result::Result<MutationOutcome, SubmitError> {
        if let Some(map) = payload.as_object_mut() {
            let now = millis_now();
            map.insert("restaurant_id".to_string(), Value::from(restaurant_id));
            map.insert("createdAt".to_string(), Value::from(now));
            map.insert("updatedAt".to_string(), Value::from(now));
        }
        let request = MutationRequest::Create {
            data: payload,
            local_key: None,
        };
        self.reviews.submit(request, SubmitOptions::default()).await
    }

    /// Update a review. A key still carrying the offline prefix belongs to
    /// a record the server has never seen, so the edit replays as a create
    /// under the same local key, merged over the stored copy (which still
    /// carries `restaurant_id` and `createdAt` from the original create).
    pub async fn update_review(
        &self,
        key: &str,
        mut payload: Value,
    ) -> std::result::Result<MutationOutcome, SubmitError> {
        if let Some(map) = payload.as_object_mut() {
            map.insert("updatedAt".to_string(), Value::from(millis_now()));
        }
        let request = if is_synthetic_key(key) {
            let data = match self.reviews.store().get(self.reviews.schema(), key) {
                Some(record) => {
                    let mut data = record.data;
                    if let (Some(base), Some(changes)) =
                        (data.as_object_mut(), payload.as_object())
                    {
                        for (field, value) in changes {
                            base.insert(field.clone(), value.clone());
                        }
                    }
                    data
                }
                None => payload,
            };
            MutationRequest::Create {
                data,
                local_key: Some(key.to_string()),
            }
        } else {
            MutationRequest::Update {
                key: key.to_string(),
                data: payload,
            }
        };
        self.reviews.submit(request, SubmitOptions::default()).await
    }

    pub async fn delete_review(
        &self,
        key: &str,
    ) -> std::result::Result<MutationOutcome, SubmitError> {
        let request = MutationRequest::Delete {
            key: key.to_string(),
        };
        self.reviews.submit(request, SubmitOptions::default()).await
    }

    /// Build and start the retry loop over both engines.
    pub fn start_retry_loop(&self, options: RetrySchedulerOptions) -> Arc<RetryScheduler> {
        let scheduler = RetryScheduler::new(
            vec![self.restaurants.clone(), self.reviews.clone()],
            options,
        );
        scheduler.start();
        scheduler
    }

    // -----------------------------------------------------------------------
    // Pure helpers over fetched restaurants
    // -----------------------------------------------------------------------

    /// Distinct string values of `field`, first-seen order (cuisine and
    /// neighborhood filter lists).
    pub fn distinct_values(records: &[StoredRecord], field: &str) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for record in records {
            if let Some(value) = record.data.get(field).and_then(Value::as_str) {
                if !values.iter().any(|v| v == value) {
                    values.push(value.to_string());
                }
            }
        }
        values
    }

    /// Filter by cuisine and neighborhood; `"all"` matches everything.
    pub fn filter_restaurants(
        records: &[StoredRecord],
        cuisine: &str,
        neighborhood: &str,
    ) -> Vec<StoredRecord> {
        records
            .iter()
            .filter(|r| {
                let field_matches = |field: &str, wanted: &str| {
                    wanted == "all"
                        || r.data.get(field).and_then(Value::as_str) == Some(wanted)
                };
                field_matches("cuisine_type", cuisine)
                    && field_matches("neighborhood", neighborhood)
            })
            .cloned()
            .collect()
    }
}
