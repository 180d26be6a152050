mod async_conversion;
mod content_type;

pub use async_conversion::AsyncTryFrom;
pub use content_type::{ContentTypeExt, OCTET_STREAM};
