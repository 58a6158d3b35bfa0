use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix for client-generated primary keys of records created before the
/// server has issued an id.
pub const SYNTHETIC_KEY_PREFIX: &str = "UNPOSTED-";

/// Stored record — the shape kept in the persistence layer.
/// `data` is the entity payload (restaurant or review fields). The three
/// flags form the record's sync lifecycle; they are persisted as the
/// integers 0/1 at the store boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub data: Value,
    pub is_on_server: bool,
    pub is_posted: bool,
    pub should_delete: bool,
}

impl StoredRecord {
    /// A record freshly confirmed by the server.
    pub fn synced(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            data,
            is_on_server: true,
            is_posted: true,
            should_delete: false,
        }
    }

    /// A record created locally that the server has never seen.
    pub fn new_local(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            data,
            is_on_server: false,
            is_posted: false,
            should_delete: false,
        }
    }

    pub fn state(&self) -> RecordState {
        if self.should_delete {
            RecordState::PendingDelete
        } else if !self.is_posted && !self.is_on_server {
            RecordState::NewLocal
        } else if !self.is_posted {
            RecordState::EditedLocal
        } else {
            RecordState::Synced
        }
    }

    /// True when the primary key was generated client-side and must never be
    /// sent to the server as an update target.
    pub fn has_synthetic_key(&self) -> bool {
        is_synthetic_key(&self.key)
    }
}

/// Lifecycle state derived from the three flags. Never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// `isOnServer=1, isPosted=1` — fully reconciled ("untouched").
    Synced,
    /// `isOnServer=0, isPosted=0` — created locally, unsent.
    NewLocal,
    /// `isOnServer=1, isPosted=0` — edited locally, unsent.
    EditedLocal,
    /// `shouldDelete=1` — delete requested, unconfirmed.
    PendingDelete,
}

/// Where a mutation result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Network,
    Local,
}

// ---------------------------------------------------------------------------
// Synthetic keys
// ---------------------------------------------------------------------------

pub fn is_synthetic_key(key: &str) -> bool {
    key.starts_with(SYNTHETIC_KEY_PREFIX)
}

/// Build the synthetic primary key for an offline-created payload.
/// Deterministic: submitting the same payload twice while offline lands on
/// the same key, so the second upsert overwrites the first instead of
/// duplicating it.
pub fn synthetic_key(data: &Value) -> String {
    let canonical = data.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let mut key = String::with_capacity(SYNTHETIC_KEY_PREFIX.len() + 64);
    key.push_str(SYNTHETIC_KEY_PREFIX);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(key, "{byte:02x}");
    }
    key
}

// ---------------------------------------------------------------------------
// StoreSchema
// ---------------------------------------------------------------------------

/// Schema for one entity store: naming, primary key field, secondary
/// indexes, boolean payload fields for the 0/1 codec, and the optional
/// retention policy (`date_key` + `limit`).
#[derive(Debug, Clone)]
pub struct StoreSchema {
    pub name: String,
    /// Payload field holding the primary key (normalized to a string key).
    pub primary_key: String,
    /// Secondary indexed fields. Flag names (`isPosted`, `isOnServer`,
    /// `shouldDelete`) address the lifecycle flags; anything else addresses
    /// a payload field.
    pub indices: Vec<String>,
    /// Payload fields coerced to 0/1 integers by the codec.
    pub bool_fields: Vec<String>,
    pub date_key: Option<String>,
    pub limit: Option<usize>,
}

impl StoreSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            indices: Vec::new(),
            bool_fields: Vec::new(),
            date_key: None,
            limit: None,
        }
    }

    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indices.push(field.into());
        self
    }

    pub fn bool_field(mut self, field: impl Into<String>) -> Self {
        self.bool_fields.push(field.into());
        self
    }

    /// Bound the store to the `limit` most recent records by `date_key`.
    pub fn retain(mut self, date_key: impl Into<String>, limit: usize) -> Self {
        self.date_key = Some(date_key.into());
        self.limit = Some(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// IndexValue
// ---------------------------------------------------------------------------

/// Value used for secondary-index lookups. Booleans are addressed as the
/// integers 0/1 — the store never indexes a JSON boolean.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Int(i64),
    Text(String),
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for IndexValue {
    fn from(v: bool) -> Self {
        Self::Int(if v { 1 } else { 0 })
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ---------------------------------------------------------------------------
// OneOrMany
// ---------------------------------------------------------------------------

/// Explicit single-record / batch union for write operations, replacing
/// runtime is-this-iterable introspection.
#[derive(Debug, Clone)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(items) if items.is_empty())
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        Self::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
