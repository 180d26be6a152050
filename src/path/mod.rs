//! Repository path handling.
//!
//! Repository paths are absolute, slash-delimited strings. Nodes address their
//! relatives with paths that may contain `.` and `..` segments; [`resolve`]
//! turns those into absolute paths the repository understands.

mod resolver;

pub use resolver::{SEPARATOR, resolve, split_parent};
