pub mod rest;
pub mod types;

pub use rest::RestTransport;
pub use types::{FetchTarget, MutationRequest, RemoteTransport, ResourceRoute};
