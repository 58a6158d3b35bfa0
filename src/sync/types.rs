//! Engine-facing types: the flag-combination partition of local records,
//! submit options and outcomes, and the update replay style.

use std::collections::HashSet;

use crate::error::DineSyncError;
use crate::types::{Origin, RecordState, StoredRecord};

/// How an edited record is replayed to the server.
#[derive(Debug, Clone)]
pub enum UpdateStyle {
    /// `PUT` with the full payload as a JSON body (reviews).
    Body,
    /// `PUT` with the named boolean payload field as a query parameter
    /// (restaurant favorites).
    QueryParam { field: String },
}

/// Local records split by flag combination during the read path.
#[derive(Debug, Default)]
pub struct Partition {
    /// `isOnServer=1, isPosted=1` — fully reconciled.
    pub untouched: Vec<StoredRecord>,
    /// `isOnServer=1, isPosted=0` — edited locally, unsent.
    pub not_yet_submitted: Vec<StoredRecord>,
    /// `isOnServer=0, isPosted=0` — created locally, unsent.
    pub not_yet_on_server: Vec<StoredRecord>,
    /// `shouldDelete=1` — delete pending; never surfaced as live data.
    pub not_yet_deleted: Vec<StoredRecord>,
}

impl Partition {
    pub fn split(records: Vec<StoredRecord>) -> Self {
        let mut partition = Self::default();
        for record in records {
            match record.state() {
                RecordState::PendingDelete => partition.not_yet_deleted.push(record),
                RecordState::NewLocal => partition.not_yet_on_server.push(record),
                RecordState::EditedLocal => partition.not_yet_submitted.push(record),
                RecordState::Synced => partition.untouched.push(record),
            }
        }
        partition
    }

    /// Everything the UI may see right now: untouched plus unsent local work.
    pub fn live(&self) -> Vec<StoredRecord> {
        let mut records = self.untouched.clone();
        records.extend(self.not_yet_on_server.iter().cloned());
        records.extend(self.not_yet_submitted.iter().cloned());
        records
    }

    /// Unsent local mutations that must survive a merge; shown alongside the
    /// filtered network result.
    pub fn pending_live(&self) -> Vec<StoredRecord> {
        let mut records = self.not_yet_on_server.clone();
        records.extend(self.not_yet_submitted.iter().cloned());
        records
    }

    /// Keys carrying any pending mutation, pending deletes included. Network
    /// records under these keys are dropped so stale server data cannot
    /// clobber local edits or resurrect a deletion.
    pub fn pending_keys(&self) -> HashSet<String> {
        self.not_yet_on_server
            .iter()
            .chain(self.not_yet_submitted.iter())
            .chain(self.not_yet_deleted.iter())
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.untouched.is_empty()
            && self.not_yet_submitted.is_empty()
            && self.not_yet_on_server.is_empty()
            && self.not_yet_deleted.is_empty()
    }
}

/// Options for the write path.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Park the mutation locally when the network is unreachable. The retry
    /// scheduler disables this so a still-offline attempt fails silently
    /// instead of re-queuing the already-pending record.
    pub allow_fallback: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            allow_fallback: true,
        }
    }
}

/// A settled write. `origin` says whether the server confirmed the mutation
/// or it was parked locally.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub record: Option<StoredRecord>,
    pub origin: Origin,
}

/// A failed write. Failures always come from the network attempt; the local
/// fallback never errors (store failures degrade to no-ops).
#[derive(Debug)]
pub struct SubmitError {
    pub error: DineSyncError,
    pub origin: Origin,
}

impl SubmitError {
    pub(crate) fn network(error: impl Into<DineSyncError>) -> Self {
        Self {
            error: error.into(),
            origin: Origin::Network,
        }
    }
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
