//! Asynchronous access to a remote content repository.
//!
//! [`RepositoryClient`] owns the session (credentials and CSRF token) and
//! exposes node, property, file, asset and replication operations. Every
//! mutation is sent, checked for a 2xx status and followed by a fresh read of
//! the affected node, so callers always get current state back rather than a
//! raw response.

mod error;
mod files;
mod nodes;
mod replication;
mod repository_client;
mod upload;

pub use error::ClientError;
pub use replication::ActivationOptions;
pub use repository_client::{Credentials, RepositoryClient};
pub use upload::FileSource;
