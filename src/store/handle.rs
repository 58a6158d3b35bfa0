//! `Store` — the handle the sync engine talks to.
//!
//! Persistence is best-effort: when the backend failed to open, or a call
//! fails at runtime, the handle logs and degrades. Reads come back empty,
//! writes become no-ops. The engine keeps serving network data either way.

use std::sync::Arc;

use crate::types::{IndexValue, OneOrMany, StoreSchema, StoredRecord};

use super::traits::StoreBackend;

#[derive(Clone)]
pub struct Store {
    backend: Option<Arc<dyn StoreBackend>>,
}

impl Store {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A handle with no backend. Every read is empty, every write a no-op.
    pub fn degraded() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Write records, then enforce the schema's retention bound if it has one.
    pub fn save(&self, schema: &StoreSchema, records: impl Into<OneOrMany<StoredRecord>>) {
        let Some(backend) = &self.backend else {
            return;
        };
        let records = records.into().into_vec();
        if records.is_empty() {
            return;
        }
        if let Err(e) = backend.upsert(schema, &records) {
            log::warn!("store {}: upsert failed: {e}", schema.name);
            return;
        }
        if let (Some(date_key), Some(limit)) = (&schema.date_key, schema.limit) {
            match backend.retain_newest(schema, date_key, limit) {
                Ok(purged) if purged > 0 => {
                    log::debug!("store {}: purged {purged} old records", schema.name);
                }
                Ok(_) => {}
                Err(e) => log::warn!("store {}: retention failed: {e}", schema.name),
            }
        }
    }

    pub fn get(&self, schema: &StoreSchema, key: &str) -> Option<StoredRecord> {
        let backend = self.backend.as_ref()?;
        match backend.get_by_key(schema, key) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("store {}: get {key} failed: {e}", schema.name);
                None
            }
        }
    }

    pub fn all(&self, schema: &StoreSchema) -> Vec<StoredRecord> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        match backend.get_all(schema) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("store {}: get_all failed: {e}", schema.name);
                Vec::new()
            }
        }
    }

    pub fn by_index(&self, schema: &StoreSchema, field: &str, value: IndexValue) -> Vec<StoredRecord> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        match backend.get_by_index(schema, field, &value) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("store {}: index lookup {field} failed: {e}", schema.name);
                Vec::new()
            }
        }
    }

    pub fn delete(&self, schema: &StoreSchema, key: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.remove(schema, key) {
            log::warn!("store {}: delete {key} failed: {e}", schema.name);
        }
    }

    /// Atomically swap a record from `old_key` to its current key.
    pub fn rekey(&self, schema: &StoreSchema, record: &StoredRecord, old_key: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.replace_key(schema, record, old_key) {
            log::warn!(
                "store {}: rekey {old_key} -> {} failed: {e}",
                schema.name,
                record.key
            );
        }
    }
}
