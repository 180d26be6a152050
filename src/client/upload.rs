use std::path::{Path, PathBuf};

use compio::fs;
use snafu::{OptionExt, ResultExt};
use tracing::debug;

use super::error::{ClientError, MissingContentTypeSnafu, ReadLocalFileSnafu};
use crate::ext::{AsyncTryFrom, ContentTypeExt, OCTET_STREAM};

/// Content for a file or asset upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file on the local disk. The type guessed from the extension wins over
    /// `content_type`, which wins over `application/octet-stream`.
    Local {
        path: PathBuf,
        content_type: Option<String>,
    },
    /// Bytes already in memory. Uploads are rejected without a content type.
    Bytes {
        data: Vec<u8>,
        content_type: Option<String>,
    },
}

impl FileSource {
    pub fn local(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        FileSource::Local {
            path: path.into(),
            content_type: Some(content_type.into()),
        }
    }

    pub fn bytes(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        FileSource::Bytes {
            data: data.into(),
            content_type: Some(content_type.into()),
        }
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        FileSource::Local {
            path,
            content_type: None,
        }
    }
}

impl From<&Path> for FileSource {
    fn from(path: &Path) -> Self {
        FileSource::from(path.to_path_buf())
    }
}

/// A local file loaded into memory.
#[derive(Debug)]
pub(crate) struct LocalFile {
    pub data: Vec<u8>,
    pub content_type: Option<&'static str>,
}

impl AsyncTryFrom<&Path> for LocalFile {
    type Error = ClientError;

    async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
        debug!("Reading local file {}", path.display());
        let data = fs::read(path).await.context(ReadLocalFileSnafu { path })?;

        Ok(LocalFile {
            data,
            content_type: path.guess_content_type(),
        })
    }
}

/// Upload content with a settled content type.
#[derive(Debug)]
pub(crate) struct Upload {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl Upload {
    /// Loads the source. `target` is the repository path, used in error messages.
    pub async fn resolve(source: FileSource, target: &str) -> Result<Self, ClientError> {
        match source {
            FileSource::Local { path, content_type } => {
                let file = LocalFile::async_try_from(path.as_path()).await?;
                let content_type = file
                    .content_type
                    .map(str::to_string)
                    .or(content_type)
                    .unwrap_or_else(|| OCTET_STREAM.to_string());
                Ok(Upload {
                    data: file.data,
                    content_type,
                })
            }
            FileSource::Bytes { data, content_type } => Ok(Upload {
                data,
                content_type: content_type.context(MissingContentTypeSnafu { path: target })?,
            }),
        }
    }
}
