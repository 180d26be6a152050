use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use serde_json::{Map, Value};
use snafu::{ResultExt, ensure};
use tracing::{debug, info};

use super::error::{
    ClientError, DecodeSnafu, MissingPathSnafu, MissingTokenSnafu, NotANodeSnafu, TransportSnafu,
};
use crate::config::{ClientConfig, FormParams};
use crate::diff::MutationBatch;
use crate::node::ResourceNode;
use crate::transport::{
    AUTHORIZATION, CONTENT_TYPE, CSRF_TOKEN, FORM_URLENCODED, Method, REFERER, Request,
    RequestBody, Response, Transport,
};

const TOKEN_FIELD: &str = "token";
const NODE_JSON_SUFFIX: &str = ".1.json";

type PendingToken = Shared<LocalBoxFuture<'static, Result<String, Arc<ClientError>>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn basic_authorization(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {encoded}")
    }
}

/// Absolute URLs of every endpoint the client talks to.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub instance: String,
    pub diff: String,
    pub token: String,
    pub referer: String,
    pub tree_activation: String,
    pub replication: String,
    pub page_version: String,
}

impl Endpoints {
    fn new(instance: &str, config: &ClientConfig) -> Self {
        Self {
            instance: instance.to_string(),
            diff: format!("{instance}{}", config.diff_endpoint),
            token: format!("{instance}{}", config.token_endpoint),
            referer: format!("{instance}{}", config.referer),
            tree_activation: format!("{instance}{}", config.tree_activation_endpoint),
            replication: format!("{instance}{}", config.replication_endpoint),
            page_version: format!("{instance}{}", config.page_version_endpoint),
        }
    }
}

struct ClientInner<T> {
    transport: T,
    config: ClientConfig,
    endpoints: Endpoints,
    username: String,
    authorization: String,
    token: RefCell<Option<PendingToken>>,
}

/// Handle to one repository instance.
///
/// Cloning is cheap and every clone shares the same session, including the
/// memoized CSRF token.
pub struct RepositoryClient<T> {
    inner: Rc<ClientInner<T>>,
}

impl<T> Clone for RepositoryClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> RepositoryClient<T> {
    /// Creates a client for the instance at `instance`, e.g. `http://localhost:4502`.
    pub fn new(
        transport: T,
        instance: impl AsRef<str>,
        credentials: Credentials,
        config: ClientConfig,
    ) -> Self {
        let instance = instance.as_ref().trim_end_matches('/');
        let endpoints = Endpoints::new(instance, &config);
        debug!("Created repository client for {}", instance);

        Self {
            inner: Rc::new(ClientInner {
                transport,
                authorization: credentials.basic_authorization(),
                username: credentials.username,
                endpoints,
                config,
                token: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub(crate) fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    pub(crate) fn username(&self) -> &str {
        &self.inner.username
    }

    /// Fetches the node at `path`, fully initialized with its properties and children.
    pub async fn node(&self, path: &str) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);

        let payload = self.fetch_node_payload(path).await?;
        Ok(ResourceNode::from_payload(self.clone(), path.to_string(), &payload))
    }

    /// Reads the one-level JSON representation of a node.
    pub(crate) async fn fetch_node_payload(
        &self,
        path: &str,
    ) -> Result<Map<String, Value>, ClientError> {
        let url = format!("{}{}{}", self.inner.endpoints.diff, path, NODE_JSON_SUFFIX);
        debug!("Fetching node '{}'", path);

        let request = self.authorized(Request::get(&url)).await?;
        let response = self.send(request).await?;
        let body = serde_json::from_slice::<Value>(&response.body)
            .context(DecodeSnafu { url: url.clone() })?;
        match body {
            Value::Object(payload) => Ok(payload),
            _ => NotANodeSnafu { url }.fail(),
        }
    }

    /// Submits a batch to the diff endpoint as one request.
    pub(crate) async fn submit(&self, batch: MutationBatch) -> Result<Response, ClientError> {
        info!("Submitting batch of {} operations", batch.len());
        debug!("Batch diff:\n{}", batch.diff_text());

        let form = batch.into_form()?;
        let url = self.inner.endpoints.diff.clone();
        self.post(url, RequestBody::Multipart(form)).await
    }

    /// Posts `params` as an url-encoded form.
    pub(crate) async fn post_form(
        &self,
        url: String,
        params: &FormParams,
    ) -> Result<Response, ClientError> {
        let body = params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");

        self.post(url, RequestBody::UrlEncoded(body)).await
    }

    pub(crate) async fn post(
        &self,
        url: String,
        body: RequestBody,
    ) -> Result<Response, ClientError> {
        let content_type = matches!(body, RequestBody::UrlEncoded(_)).then_some(FORM_URLENCODED);
        let mut request = self.authorized(Request::post(url, body)).await?;
        if let Some(content_type) = content_type {
            request = request.with_header(CONTENT_TYPE, content_type);
        }
        self.send(request).await
    }

    /// Adds the session headers to a request.
    async fn authorized(&self, request: Request) -> Result<Request, ClientError> {
        let token = self.token().await?;
        let request = request
            .with_header(AUTHORIZATION, &self.inner.authorization)
            .with_header(REFERER, &self.inner.endpoints.referer);

        Ok(match token {
            Some(token) => request.with_header(CSRF_TOKEN, token),
            None => request,
        })
    }

    async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let url = request.url.clone();
        debug!("{} {}", request.method, url);

        let response = self
            .inner
            .transport
            .send(request)
            .await
            .context(TransportSnafu { url: url.clone() })?;

        if !response.is_success() {
            debug!("{} answered with status {}", url, response.status);
            return Err(ClientError::UnsuccessfulStatus { url, response });
        }
        Ok(response)
    }

    /// The session's CSRF token, or `None` when tokens are disabled.
    ///
    /// The first caller starts the fetch; callers arriving while it is pending
    /// await the same request. A failed fetch is forgotten so a later call can
    /// try again.
    pub(crate) async fn token(&self) -> Result<Option<String>, ClientError> {
        if !self.inner.config.use_token {
            return Ok(None);
        }

        let pending = self
            .inner
            .token
            .borrow_mut()
            .get_or_insert_with(|| {
                let client = self.clone();
                async move { client.fetch_token().await.map_err(Arc::new) }
                    .boxed_local()
                    .shared()
            })
            .clone();

        match pending.clone().await {
            Ok(token) => Ok(Some(token)),
            Err(source) => {
                let mut memo = self.inner.token.borrow_mut();
                if memo.as_ref().is_some_and(|memoized| memoized.ptr_eq(&pending)) {
                    memo.take();
                }
                Err(ClientError::Shared { source })
            }
        }
    }

    async fn fetch_token(&self) -> Result<String, ClientError> {
        let url = self.inner.endpoints.token.clone();
        info!("Requesting CSRF token from {}", url);

        let request = Request::get(&url).with_header(AUTHORIZATION, &self.inner.authorization);
        let response = self.send(request).await?;
        let body: Value =
            serde_json::from_slice(&response.body).context(DecodeSnafu { url: url.clone() })?;

        match body.get(TOKEN_FIELD).and_then(Value::as_str) {
            Some(token) => Ok(token.to_string()),
            None => MissingTokenSnafu {
                body: body.to_string(),
            }
            .fail(),
        }
    }
}
