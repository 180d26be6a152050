use snafu::ensure;
use tracing::info;

use super::error::{ClientError, MissingPathSnafu};
use super::repository_client::RepositoryClient;
use crate::diff::{MutationBatch, PropertyValue};
use crate::node::{PRIMARY_TYPE, Properties, ResourceNode};
use crate::transport::Transport;

impl<T: Transport + 'static> RepositoryClient<T> {
    /// Creates a node of the given primary type with initial properties.
    ///
    /// A `jcr:primaryType` entry in `properties` is ignored; the type argument wins.
    pub async fn create_node(
        &self,
        path: &str,
        primary_type: &str,
        properties: &Properties,
    ) -> Result<ResourceNode<T>, ClientError> {
        let mut batch = MutationBatch::new();
        batch.create_node(path, primary_type)?;
        for (name, value) in properties.iter().filter(|(name, _)| *name != PRIMARY_TYPE) {
            batch.set_property(path, name.as_str(), value.clone())?;
        }

        info!("Creating node '{}' of type '{}'", path, primary_type);
        self.submit(batch).await?;
        self.node(path).await
    }

    /// Moves a node and returns it from its new location.
    pub async fn move_node(
        &self,
        path: &str,
        destination: &str,
    ) -> Result<ResourceNode<T>, ClientError> {
        let mut batch = MutationBatch::new();
        batch.move_node(path, destination)?;

        info!("Moving node '{}' to '{}'", path, destination);
        self.submit(batch).await?;
        self.node(destination).await
    }

    pub async fn remove_node(&self, path: &str) -> Result<(), ClientError> {
        let mut batch = MutationBatch::new();
        batch.remove_node(path)?;

        info!("Removing node '{}'", path);
        self.submit(batch).await?;
        Ok(())
    }

    pub async fn set_properties(
        &self,
        path: &str,
        properties: &Properties,
    ) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);

        let mut batch = MutationBatch::new();
        for (name, value) in properties {
            batch.set_property(path, name.as_str(), value.clone())?;
        }

        info!("Setting {} properties on '{}'", batch.len(), path);
        self.submit(batch).await?;
        self.node(path).await
    }

    /// Sets a single property. A `None` value is rejected before anything is sent.
    pub async fn set_property(
        &self,
        path: &str,
        name: &str,
        value: impl Into<Option<PropertyValue>>,
    ) -> Result<ResourceNode<T>, ClientError> {
        let mut batch = MutationBatch::new();
        batch.set_property(path, name, value)?;

        info!("Setting property '{}' on '{}'", name, path);
        self.submit(batch).await?;
        self.node(path).await
    }

    pub async fn remove_properties(
        &self,
        path: &str,
        names: &[&str],
    ) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);

        let mut batch = MutationBatch::new();
        for name in names {
            batch.remove_property(path, *name)?;
        }

        info!("Removing {} properties from '{}'", batch.len(), path);
        self.submit(batch).await?;
        self.node(path).await
    }

    pub async fn remove_property(
        &self,
        path: &str,
        name: &str,
    ) -> Result<ResourceNode<T>, ClientError> {
        self.remove_properties(path, &[name]).await
    }
}
