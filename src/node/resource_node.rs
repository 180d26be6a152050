use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use hashlink::LinkedHashMap;
use serde_json::{Map, Value};
use tracing::debug;

use super::payload::NodeContents;
use crate::client::{ActivationOptions, ClientError, FileSource, RepositoryClient};
use crate::diff::PropertyValue;
use crate::path::{SEPARATOR, resolve};
use crate::transport::Transport;

pub type Properties = LinkedHashMap<String, PropertyValue>;
pub type Children<T> = LinkedHashMap<String, ResourceNode<T>>;

type PendingContents<T> =
    Shared<LocalBoxFuture<'static, Result<NodeContents<T>, Arc<ClientError>>>>;

enum NodeState<T> {
    Unloaded,
    Loading(PendingContents<T>),
    Loaded(NodeContents<T>),
}

struct NodeInner<T> {
    path: String,
    client: RepositoryClient<T>,
    state: RefCell<NodeState<T>>,
}

/// One position in the repository tree.
///
/// Handles are cheap to clone and share the same cache. Mutations go through
/// the client and return a freshly read node; the cache of the node they were
/// called on is left as it was.
pub struct ResourceNode<T> {
    inner: Rc<NodeInner<T>>,
}

impl<T> Clone for ResourceNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ResourceNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceNode")
            .field("path", &self.inner.path)
            .field(
                "loaded",
                &matches!(*self.inner.state.borrow(), NodeState::Loaded(_)),
            )
            .finish()
    }
}

impl<T: Transport + 'static> ResourceNode<T> {
    /// Builds an initialized node, and its described subtree, from a JSON representation.
    pub(crate) fn from_payload(
        client: RepositoryClient<T>,
        path: String,
        payload: &Map<String, Value>,
    ) -> Self {
        let contents = NodeContents::parse(&client, &path, payload);
        Self::with_state(client, path, NodeState::Loaded(contents))
    }

    /// A node whose contents will be fetched on first access.
    pub(crate) fn placeholder(client: RepositoryClient<T>, path: String) -> Self {
        Self::with_state(client, path, NodeState::Unloaded)
    }

    fn with_state(client: RepositoryClient<T>, path: String, state: NodeState<T>) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                path,
                client,
                state: RefCell::new(state),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn client(&self) -> &RepositoryClient<T> {
        &self.inner.client
    }

    /// Whether properties and children are cached.
    pub fn is_loaded(&self) -> bool {
        matches!(*self.inner.state.borrow(), NodeState::Loaded(_))
    }

    pub async fn properties(&self) -> Result<Rc<Properties>, ClientError> {
        Ok(self.contents().await?.properties)
    }

    pub async fn children(&self) -> Result<Rc<Children<T>>, ClientError> {
        Ok(self.contents().await?.children)
    }

    /// Drops the cached contents so the next read fetches them again.
    pub fn refresh(&self) {
        debug!("Dropping cached contents of '{}'", self.inner.path);
        *self.inner.state.borrow_mut() = NodeState::Unloaded;
    }

    /// Looks up a descendant by relative path.
    ///
    /// Cached children that are already loaded are walked without a request.
    /// Anything else is fetched from the repository; a fetched direct child
    /// also replaces its placeholder in this node's children.
    pub async fn child(&self, relative: &str) -> Result<ResourceNode<T>, ClientError> {
        let (direct, remainder) = match relative.split_once(SEPARATOR) {
            Some((direct, remainder)) => (direct, Some(remainder)),
            None => (relative, None),
        };

        if let Some(cached) = self.loaded_child(direct) {
            return match remainder {
                Some(remainder) if !remainder.is_empty() => {
                    Box::pin(cached.child(remainder)).await
                }
                _ => Ok(cached),
            };
        }

        let path = resolve(&self.inner.path, relative, 0);
        let node = self.inner.client.node(&path).await?;
        if remainder.is_none() {
            self.adopt(direct, &node);
        }
        Ok(node)
    }

    pub async fn set_property(
        &self,
        name: &str,
        value: impl Into<Option<PropertyValue>>,
    ) -> Result<ResourceNode<T>, ClientError> {
        self.inner
            .client
            .set_property(&self.inner.path, name, value)
            .await
    }

    pub async fn set_properties(
        &self,
        properties: &Properties,
    ) -> Result<ResourceNode<T>, ClientError> {
        self.inner
            .client
            .set_properties(&self.inner.path, properties)
            .await
    }

    pub async fn remove_property(&self, name: &str) -> Result<ResourceNode<T>, ClientError> {
        self.inner
            .client
            .remove_property(&self.inner.path, name)
            .await
    }

    pub async fn remove_properties(&self, names: &[&str]) -> Result<ResourceNode<T>, ClientError> {
        self.inner
            .client
            .remove_properties(&self.inner.path, names)
            .await
    }

    pub async fn create_child(
        &self,
        relative: &str,
        primary_type: &str,
        properties: &Properties,
    ) -> Result<ResourceNode<T>, ClientError> {
        let path = self.resolve(relative);
        self.inner
            .client
            .create_node(&path, primary_type, properties)
            .await
    }

    /// Moves a descendant. Both paths are relative to this node.
    pub async fn move_child(
        &self,
        relative: &str,
        destination: &str,
    ) -> Result<ResourceNode<T>, ClientError> {
        let path = self.resolve(relative);
        let destination = self.resolve(destination);
        self.inner.client.move_node(&path, &destination).await
    }

    pub async fn remove_child(&self, relative: &str) -> Result<(), ClientError> {
        let path = self.resolve(relative);
        self.inner.client.remove_node(&path).await
    }

    /// Moves this node. A relative destination names a sibling, so `"renamed"`
    /// on `/a/b` moves it to `/a/renamed`.
    pub async fn move_to(&self, destination: &str) -> Result<ResourceNode<T>, ClientError> {
        let destination = resolve(&self.inner.path, destination, 1);
        self.inner
            .client
            .move_node(&self.inner.path, &destination)
            .await
    }

    pub async fn remove(&self) -> Result<(), ClientError> {
        self.inner.client.remove_node(&self.inner.path).await
    }

    pub async fn create_file(
        &self,
        relative: &str,
        source: impl Into<FileSource>,
        encoding: Option<&str>,
    ) -> Result<ResourceNode<T>, ClientError> {
        let path = self.resolve(relative);
        self.inner
            .client
            .create_file(&path, source.into(), encoding)
            .await
    }

    pub async fn update_file(
        &self,
        relative: &str,
        source: impl Into<FileSource>,
        encoding: Option<&str>,
    ) -> Result<ResourceNode<T>, ClientError> {
        let path = self.resolve(relative);
        self.inner
            .client
            .update_file(&path, source.into(), encoding)
            .await
    }

    pub async fn remove_file(&self, relative: &str) -> Result<(), ClientError> {
        let path = self.resolve(relative);
        self.inner.client.remove_file(&path).await
    }

    pub async fn create_asset(
        &self,
        relative: &str,
        source: impl Into<FileSource>,
    ) -> Result<ResourceNode<T>, ClientError> {
        let path = self.resolve(relative);
        self.inner.client.create_asset(&path, source.into()).await
    }

    pub async fn update_asset(
        &self,
        relative: &str,
        source: impl Into<FileSource>,
    ) -> Result<ResourceNode<T>, ClientError> {
        let path = self.resolve(relative);
        self.inner.client.update_asset(&path, source.into()).await
    }

    pub async fn remove_asset(&self, relative: &str) -> Result<(), ClientError> {
        let path = self.resolve(relative);
        self.inner.client.remove_asset(&path).await
    }

    pub async fn activate(
        &self,
        options: ActivationOptions,
    ) -> Result<ResourceNode<T>, ClientError> {
        self.inner
            .client
            .activate_node(&self.inner.path, options)
            .await
    }

    pub async fn deactivate(&self) -> Result<ResourceNode<T>, ClientError> {
        self.inner.client.deactivate_node(&self.inner.path).await
    }

    pub async fn create_version(
        &self,
        label: &str,
        comment: &str,
    ) -> Result<ResourceNode<T>, ClientError> {
        self.inner
            .client
            .create_version(&self.inner.path, label, comment)
            .await
    }

    fn resolve(&self, relative: &str) -> String {
        resolve(&self.inner.path, relative, 0)
    }

    /// Returns the cached pair, fetching it first if needed.
    ///
    /// Only the caller whose fetch is still the current one installs the
    /// result, so a `refresh` during the fetch is not undone.
    async fn contents(&self) -> Result<NodeContents<T>, ClientError> {
        let pending = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                NodeState::Loaded(contents) => return Ok(contents.clone()),
                NodeState::Loading(pending) => pending.clone(),
                NodeState::Unloaded => {
                    let pending = self.load();
                    *state = NodeState::Loading(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.inner.state.borrow_mut();
        let current = matches!(&*state, NodeState::Loading(active) if active.ptr_eq(&pending));
        match result {
            Ok(contents) => {
                if current {
                    *state = NodeState::Loaded(contents.clone());
                }
                Ok(contents)
            }
            Err(source) => {
                if current {
                    *state = NodeState::Unloaded;
                }
                Err(ClientError::Shared { source })
            }
        }
    }

    fn load(&self) -> PendingContents<T> {
        let client = self.inner.client.clone();
        let path = self.inner.path.clone();
        debug!("Loading contents of '{}'", path);

        async move {
            let payload = client.fetch_node_payload(&path).await.map_err(Arc::new)?;
            Ok::<_, Arc<ClientError>>(NodeContents::parse(&client, &path, &payload))
        }
        .boxed_local()
        .shared()
    }

    fn loaded_child(&self, name: &str) -> Option<ResourceNode<T>> {
        let state = self.inner.state.borrow();
        let NodeState::Loaded(contents) = &*state else {
            return None;
        };
        contents
            .children
            .get(name)
            .filter(|child| child.is_loaded())
            .cloned()
    }

    /// Swaps a placeholder child for a loaded node by rebuilding the children map.
    fn adopt(&self, name: &str, node: &ResourceNode<T>) {
        let mut state = self.inner.state.borrow_mut();
        let NodeState::Loaded(contents) = &mut *state else {
            return;
        };
        let replaces_placeholder = contents
            .children
            .get(name)
            .is_some_and(|existing| existing.path() == node.path() && !existing.is_loaded());
        if !replaces_placeholder {
            return;
        }

        debug!("Caching loaded child '{}' of '{}'", name, self.inner.path);
        let children = contents
            .children
            .iter()
            .map(|(key, child)| {
                let child = if key == name { node.clone() } else { child.clone() };
                (key.clone(), child)
            })
            .collect();
        *contents = NodeContents {
            properties: Rc::clone(&contents.properties),
            children: Rc::new(children),
        };
    }
}
