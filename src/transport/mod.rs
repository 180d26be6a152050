//! The HTTP seam between the client and the outside world.
//!
//! The client never talks to a socket itself. It builds [`Request`] values and
//! hands them to a [`Transport`], which is supplied by the embedding
//! application (or by tests).

mod request;

pub use request::{
    AUTHORIZATION, CONTENT_TYPE, CSRF_TOKEN, FORM_URLENCODED, FormPart, Method, MultipartForm,
    REFERER, Request, RequestBody, Response,
};

/// Error type returned by transports that failed to produce any response.
pub type TransportFailure = Box<dyn std::error::Error + Send + Sync>;

#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Sends the request and returns whatever response the server produced.
    ///
    /// Non-2xx statuses are not failures at this level; the client inspects the
    /// status itself.
    async fn send(&self, request: Request) -> Result<Response, TransportFailure>;
}
