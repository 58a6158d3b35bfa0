//! The `StoreBackend` trait — raw persistence operations behind the `Store`
//! handle. Backends are synchronous; the engine wraps calls as needed.

use crate::error::StoreError;
use crate::types::{IndexValue, StoreSchema, StoredRecord};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The three lifecycle flags live outside the payload. Index lookups address
/// them by their wire names; everything else addresses a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagField {
    IsOnServer,
    IsPosted,
    ShouldDelete,
}

impl FlagField {
    pub fn parse(field: &str) -> Option<Self> {
        match field {
            "isOnServer" => Some(Self::IsOnServer),
            "isPosted" => Some(Self::IsPosted),
            "shouldDelete" => Some(Self::ShouldDelete),
            _ => None,
        }
    }

    pub fn of(self, record: &StoredRecord) -> bool {
        match self {
            Self::IsOnServer => record.is_on_server,
            Self::IsPosted => record.is_posted,
            Self::ShouldDelete => record.should_delete,
        }
    }
}

/// Raw persistence operations, schema passed per call.
pub trait StoreBackend: Send + Sync {
    /// Insert or overwrite records by key.
    fn upsert(&self, schema: &StoreSchema, records: &[StoredRecord]) -> StoreResult<()>;

    fn get_by_key(&self, schema: &StoreSchema, key: &str) -> StoreResult<Option<StoredRecord>>;

    fn get_all(&self, schema: &StoreSchema) -> StoreResult<Vec<StoredRecord>>;

    /// Look up records by a secondary index. `field` must appear in the
    /// schema's index list; flag names address the lifecycle flags.
    fn get_by_index(
        &self,
        schema: &StoreSchema,
        field: &str,
        value: &IndexValue,
    ) -> StoreResult<Vec<StoredRecord>>;

    fn remove(&self, schema: &StoreSchema, key: &str) -> StoreResult<()>;

    /// Atomically delete `old_key` and write `record` under its own key.
    /// Used when the server issues a real id for a synthetic-keyed record.
    fn replace_key(
        &self,
        schema: &StoreSchema,
        record: &StoredRecord,
        old_key: &str,
    ) -> StoreResult<()>;

    /// Drop all but the `limit` newest records, ordered by the payload field
    /// `date_key` descending. Returns the number purged.
    fn retain_newest(
        &self,
        schema: &StoreSchema,
        date_key: &str,
        limit: usize,
    ) -> StoreResult<usize>;
}

/// Validate that `field` is declared in the schema's index list.
pub(crate) fn check_indexed(schema: &StoreSchema, field: &str) -> StoreResult<()> {
    if schema.indices.iter().any(|f| f == field) {
        Ok(())
    } else {
        Err(StoreError::UnknownIndex(field.to_string()))
    }
}
