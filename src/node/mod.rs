//! The lazily loaded node tree.
//!
//! A [`ResourceNode`] either holds its properties and children together or
//! holds neither. The first read of an empty node fetches its one-level JSON
//! representation and installs both halves at once; callers arriving while
//! that fetch is pending await the same request.

mod payload;
mod resource_node;

pub use resource_node::{Children, Properties, ResourceNode};

/// Property naming the node kind. Required when a node is created.
pub const PRIMARY_TYPE: &str = "jcr:primaryType";

/// Keys with this prefix in a node representation carry metadata, not content.
pub const METADATA_PREFIX: char = ':';
