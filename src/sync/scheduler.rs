//! RetryScheduler — timer-driven convergence of pending local mutations.
//!
//! Every tick scans each engine's store for the three pending flag shapes
//! and replays the matching write. Replays run with fallback disabled so a
//! still-offline attempt fails silently and the record stays pending for
//! the next tick. Every error is logged and swallowed; the scheduler has no
//! UI to report to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::remote::MutationRequest;
use crate::sync::engine::SyncEngine;
use crate::sync::types::SubmitOptions;
use crate::types::StoredRecord;

/// Fired after a pending record is confirmed by the server, with the store
/// name and the reconciled record (e.g. to swap a placeholder id in the UI).
pub type SyncedCallback = dyn Fn(&str, &StoredRecord) + Send + Sync;

pub struct RetrySchedulerOptions {
    pub interval: Duration,
    pub on_synced: Option<Arc<SyncedCallback>>,
}

impl Default for RetrySchedulerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            on_synced: None,
        }
    }
}

pub struct RetryScheduler {
    engines: Vec<Arc<SyncEngine>>,
    interval: Duration,
    on_synced: Option<Arc<SyncedCallback>>,
    disposed: Arc<AtomicBool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RetryScheduler {
    pub fn new(engines: Vec<Arc<SyncEngine>>, options: RetrySchedulerOptions) -> Arc<Self> {
        Arc::new(Self {
            engines,
            interval: options.interval,
            on_synced: options.on_synced,
            disposed: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }

    /// Spawn the periodic loop. Ticks are serialized by construction: the
    /// next sleep only starts after the previous tick's awaits settle.
    pub fn start(self: &Arc<Self>) {
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(scheduler.interval).await;
                if scheduler.disposed.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.tick().await;
            }
        });
        *self.handle.lock() = Some(handle);
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// One full pass over every engine. Public so tests (and callers who
    /// want an eager flush on reconnect) can drive it directly.
    pub async fn tick(&self) {
        for engine in &self.engines {
            if !engine.store().is_available() {
                continue;
            }
            self.replay_deletes(engine).await;
            self.replay_creates(engine).await;
            self.replay_updates(engine).await;
        }
    }

    /// `shouldDelete=1`: purge synthetic-key records locally (the server
    /// never saw the create), replay a DELETE for the rest.
    async fn replay_deletes(&self, engine: &Arc<SyncEngine>) {
        for record in self.pending(engine, "shouldDelete", true) {
            if record.has_synthetic_key() {
                engine.store().delete(engine.schema(), &record.key);
                continue;
            }
            let request = MutationRequest::Delete {
                key: record.key.clone(),
            };
            self.replay(engine, request, &record).await;
        }
    }

    /// `isOnServer=0` (minus pending deletes): replay the create, carrying
    /// the stored key so success can rekey to the server-issued id.
    async fn replay_creates(&self, engine: &Arc<SyncEngine>) {
        for record in self.pending(engine, "isOnServer", false) {
            if record.should_delete {
                continue;
            }
            let request = MutationRequest::Create {
                data: record.data.clone(),
                local_key: Some(record.key.clone()),
            };
            self.replay(engine, request, &record).await;
        }
    }

    /// `isPosted=0, isOnServer=1` (minus pending deletes): replay an update
    /// per the engine's update style.
    async fn replay_updates(&self, engine: &Arc<SyncEngine>) {
        for record in self.pending(engine, "isPosted", false) {
            if record.should_delete || !record.is_on_server {
                continue;
            }
            let request = engine.update_request_for(&record);
            self.replay(engine, request, &record).await;
        }
    }

    /// Index scan for a flag value, skipping flags the schema does not
    /// index (a store with no offline creates never indexes `isOnServer`).
    fn pending(&self, engine: &Arc<SyncEngine>, flag: &str, value: bool) -> Vec<StoredRecord> {
        let schema = engine.schema();
        if !schema.indices.iter().any(|f| f == flag) {
            return Vec::new();
        }
        engine.store().by_index(schema, flag, value.into())
    }

    async fn replay(
        &self,
        engine: &Arc<SyncEngine>,
        request: MutationRequest,
        pending: &StoredRecord,
    ) {
        let options = SubmitOptions {
            allow_fallback: false,
        };
        match engine.submit(request, options).await {
            Ok(outcome) => {
                log::debug!(
                    "store {}: pending record {} reconciled",
                    engine.schema().name,
                    pending.key
                );
                if let (Some(callback), Some(record)) = (&self.on_synced, &outcome.record) {
                    callback(&engine.schema().name, record);
                }
            }
            Err(e) => {
                log::debug!(
                    "store {}: retry for {} failed, still pending: {e}",
                    engine.schema().name,
                    pending.key
                );
            }
        }
    }
}
