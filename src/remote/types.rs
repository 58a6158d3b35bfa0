//! Transport-facing request types and the `RemoteTransport` seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// REST routing for one entity kind.
#[derive(Debug, Clone)]
pub struct ResourceRoute {
    /// Path segment under the API base, e.g. `"reviews"`.
    pub path: String,
}

impl ResourceRoute {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// What to fetch from the server.
#[derive(Debug, Clone)]
pub enum FetchTarget {
    /// Whole collection.
    All,
    /// Single entity by server id.
    ById(String),
    /// Filtered collection, e.g. reviews for one restaurant.
    ByIndex { field: String, value: String },
}

/// A mutation to replay against the server. `Create` carries the local
/// synthetic key (when the record was parked offline) so a successful
/// replay can rekey the stored record to the server-issued id.
#[derive(Debug, Clone)]
pub enum MutationRequest {
    Create {
        data: Value,
        local_key: Option<String>,
    },
    Update {
        key: String,
        data: Value,
    },
    /// Update expressed as a query parameter rather than a body, e.g.
    /// `PUT /restaurants/42/?is_favorite=true`.
    UpdateQuery {
        key: String,
        field: String,
        value: bool,
    },
    Delete {
        key: String,
    },
}

impl MutationRequest {
    /// The server-side key this mutation targets, if it has one yet.
    pub fn target_key(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Update { key, .. }
            | Self::UpdateQuery { key, .. }
            | Self::Delete { key } => Some(key),
        }
    }
}

/// The wire seam. Production uses `RestTransport`; tests plug in mocks.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetch entities. Single-entity targets come back as a one-element vec.
    async fn fetch(&self, route: &ResourceRoute, target: &FetchTarget)
        -> RemoteResult<Vec<Value>>;

    /// Replay a mutation. Returns the server's echo of the entity when the
    /// endpoint provides one.
    async fn submit(
        &self,
        route: &ResourceRoute,
        request: &MutationRequest,
    ) -> RemoteResult<Option<Value>>;
}
