use std::path::PathBuf;
use std::sync::Arc;

use snafu::Snafu;

use crate::diff::BatchError;
use crate::transport::{Response, TransportFailure};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("A node path is required"))]
    MissingPath,
    #[snafu(display("Failed to build the mutation batch"))]
    Batch { source: BatchError },
    #[snafu(display("Cannot split '{}' into a parent path and a name", path))]
    UnsplittablePath { path: String },
    #[snafu(display("A content type is required to upload raw bytes to '{}'", path))]
    MissingContentType { path: String },
    #[snafu(display("Failed to read local file {}", path.display()))]
    ReadLocalFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Request to '{}' could not be sent", url))]
    Transport {
        url: String,
        source: TransportFailure,
    },
    #[snafu(display(
        "Request to '{}' failed with status {} {}",
        url,
        response.status,
        response.status_text
    ))]
    UnsuccessfulStatus { url: String, response: Response },
    #[snafu(display("Response from '{}' is not valid JSON", url))]
    Decode {
        url: String,
        source: serde_json::Error,
    },
    #[snafu(display("Response from '{}' is not a node representation", url))]
    NotANode { url: String },
    #[snafu(display("No token found in server response: {}", body))]
    MissingToken { body: String },
    #[snafu(display("A request shared with other callers failed"))]
    Shared { source: Arc<ClientError> },
}

impl ClientError {
    /// The response attached to a status failure, looking through shared failures.
    pub fn response(&self) -> Option<&Response> {
        match self {
            ClientError::UnsuccessfulStatus { response, .. } => Some(response),
            ClientError::Shared { source } => source.response(),
            _ => None,
        }
    }

    /// The HTTP status of a failed request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|response| response.status)
    }
}

impl From<BatchError> for ClientError {
    fn from(source: BatchError) -> Self {
        ClientError::Batch { source }
    }
}
