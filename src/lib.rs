#![allow(clippy::enum_variant_names)]

//! Async client for hierarchical content repositories.
//!
//! A [`RepositoryClient`] talks to one repository instance through a
//! caller-supplied [`Transport`]. Reads hand out [`ResourceNode`]s that fetch
//! and cache their properties and children on first access. Writes are
//! encoded as [`MutationBatch`]es in the repository's diff protocol and sent
//! as a single request. [`ConcurrencyLimiter`] drives many such operations
//! with a fixed number in flight.
//!
//! ```rust,ignore
//! let client = RepositoryClient::new(transport, "http://localhost:4502", credentials, ClientConfig::default());
//! let content = client.node("/content").await?;
//! let page = content.create_child("site", "cq:Page", &Properties::new()).await?;
//! page.set_property("jcr:title", PropertyValue::from("Site")).await?;
//! ```

pub mod client;
pub mod config;
pub mod diff;
pub mod executor;
pub mod ext;
pub mod node;
pub mod path;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{ActivationOptions, ClientError, Credentials, FileSource, RepositoryClient};
pub use config::{ClientConfig, ConfigError};
pub use diff::{BatchError, MutationBatch, PropertyValue};
pub use executor::ConcurrencyLimiter;
pub use node::{Children, Properties, ResourceNode};
pub use transport::{Request, Response, Transport, TransportFailure};
