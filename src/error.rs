use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures from the persistent store layer.
///
/// These never bubble past the sync engine: the `Store` handle logs them and
/// degrades to "no local data". They are still typed so backends and tests
/// can distinguish causes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No persistence backend is available")]
    Unavailable,

    #[error("Store corruption in {store}/{key}: failed to parse \"{field}\"")]
    Corruption {
        store: String,
        key: String,
        field: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Field \"{0}\" is not indexed for this store")]
    UnknownIndex(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Failures from the remote REST client.
///
/// Only `Unreachable` permits the engine's offline fallback: the request
/// never completed, so the server state is unknown and the mutation can be
/// parked locally. A completed request that failed (`Server`,
/// `Serialization`) is surfaced as a hard error.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Serialization(String),
}

impl RemoteError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// True when the request never completed (offline, DNS, timeout) — the
    /// one case where the write path may fall back to local storage.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Serialization(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Server {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            // connect / timeout / request / body errors: the request never
            // round-tripped
            Self::Unreachable(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// DineSyncError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DineSyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DineSyncError>;
