//! The repository's diff protocol.
//!
//! A batch of mutations is sent as one multipart request. Structural changes
//! and plain property values travel as text lines in the `:diff` field, one
//! operation per line:
//!
//! ```text
//! +/content/x : {"jcr:primaryType":"nt:folder"}
//! ^/content/x/title : "Pikachu"
//! >/content/x : /content/y
//! -/content/y : 
//! ```
//!
//! Dates and binaries cannot be expressed inline. Their lines carry an empty
//! payload and the value is attached as a separate form field keyed by
//! `<path>/<property>`.

mod batch;
mod value;

pub use batch::{Attachment, BatchError, DIFF_FIELD, MutationBatch, Operation};
pub use value::PropertyValue;
