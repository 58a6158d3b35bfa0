pub mod codec;
pub mod error;
pub mod types;

pub mod directory;
pub mod remote;
pub mod store;
pub mod sync;

pub use directory::{Directory, DirectoryOptions};
pub use error::{DineSyncError, RemoteError, Result, StoreError};
pub use types::{IndexValue, OneOrMany, Origin, RecordState, StoreSchema, StoredRecord};
