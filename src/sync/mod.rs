pub mod engine;
pub mod scheduler;
pub mod types;

pub use engine::SyncEngine;
pub use scheduler::{RetryScheduler, RetrySchedulerOptions, SyncedCallback};
pub use types::{MutationOutcome, Partition, SubmitError, SubmitOptions, UpdateStyle};
