//! In-memory backend. Same contract as the SQLite backend, backed by
//! HashMaps behind a `parking_lot::Mutex`. Used in tests and as the
//! fallback when no durable storage is wanted.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::codec::flag_to_int;
use crate::types::{IndexValue, StoreSchema, StoredRecord};

use super::traits::{check_indexed, FlagField, StoreBackend, StoreResult};

/// store name → (key → record)
type Stores = HashMap<String, HashMap<String, StoredRecord>>;

#[derive(Default)]
pub struct MemoryBackend {
    stores: Mutex<Stores>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn index_matches(record: &StoredRecord, field: &str, value: &IndexValue) -> bool {
    if let Some(flag) = FlagField::parse(field) {
        return *value == IndexValue::Int(i64::from(flag.of(record)));
    }
    match (record.data.get(field), value) {
        (Some(Value::String(s)), IndexValue::Text(t)) => s == t,
        (Some(v @ (Value::Number(_) | Value::Bool(_))), IndexValue::Int(i)) => {
            flag_to_int_wide(v) == Some(*i)
        }
        _ => false,
    }
}

/// Like the codec's 0/1 coercion but preserving full integer range, so a
/// numeric index on e.g. a count field compares correctly.
fn flag_to_int_wide(v: &Value) -> Option<i64> {
    match v {
        Value::Bool(_) => Some(flag_to_int(v)),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

impl StoreBackend for MemoryBackend {
    fn upsert(&self, schema: &StoreSchema, records: &[StoredRecord]) -> StoreResult<()> {
        let mut stores = self.stores.lock();
        let store = stores.entry(schema.name.clone()).or_default();
        for record in records {
            store.insert(record.key.clone(), record.clone());
        }
        Ok(())
    }

    fn get_by_key(&self, schema: &StoreSchema, key: &str) -> StoreResult<Option<StoredRecord>> {
        Ok(self
            .stores
            .lock()
            .get(&schema.name)
            .and_then(|store| store.get(key))
            .cloned())
    }

    fn get_all(&self, schema: &StoreSchema) -> StoreResult<Vec<StoredRecord>> {
        Ok(self
            .stores
            .lock()
            .get(&schema.name)
            .map(|store| store.values().cloned().collect())
            .unwrap_or_default())
    }

    fn get_by_index(
        &self,
        schema: &StoreSchema,
        field: &str,
        value: &IndexValue,
    ) -> StoreResult<Vec<StoredRecord>> {
        check_indexed(schema, field)?;
        Ok(self
            .stores
            .lock()
            .get(&schema.name)
            .map(|store| {
                store
                    .values()
                    .filter(|r| index_matches(r, field, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn remove(&self, schema: &StoreSchema, key: &str) -> StoreResult<()> {
        if let Some(store) = self.stores.lock().get_mut(&schema.name) {
            store.remove(key);
        }
        Ok(())
    }

    fn replace_key(
        &self,
        schema: &StoreSchema,
        record: &StoredRecord,
        old_key: &str,
    ) -> StoreResult<()> {
        let mut stores = self.stores.lock();
        let store = stores.entry(schema.name.clone()).or_default();
        store.remove(old_key);
        store.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn retain_newest(
        &self,
        schema: &StoreSchema,
        date_key: &str,
        limit: usize,
    ) -> StoreResult<usize> {
        let mut stores = self.stores.lock();
        let Some(store) = stores.get_mut(&schema.name) else {
            return Ok(0);
        };
        if store.len() <= limit {
            return Ok(0);
        }

        let mut keyed: Vec<(String, i64)> = store
            .values()
            .map(|r| {
                let stamp = r.data.get(date_key).and_then(Value::as_i64).unwrap_or(0);
                (r.key.clone(), stamp)
            })
            .collect();
        keyed.sort_by(|a, b| b.1.cmp(&a.1));

        let purged: Vec<String> = keyed.drain(limit..).map(|(key, _)| key).collect();
        for key in &purged {
            store.remove(key);
        }
        Ok(purged.len())
    }
}
