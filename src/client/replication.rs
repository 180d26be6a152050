use snafu::ensure;
use tracing::info;

use super::error::{ClientError, MissingPathSnafu};
use super::repository_client::RepositoryClient;
use crate::config::FormParams;
use crate::node::ResourceNode;
use crate::transport::Transport;

const CHARSET: &str = "_charset_";
const FORM_TOKEN: &str = ":cq_csrf_token";

/// Options for [`RepositoryClient::activate_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationOptions {
    /// Activate the whole subtree instead of the single node.
    pub tree: bool,
    /// Tree activation only: skip nodes that are unchanged since their last activation.
    pub only_modified: bool,
    /// Tree activation only: skip nodes that are currently deactivated.
    pub ignore_deactivated: bool,
}

impl Default for ActivationOptions {
    fn default() -> Self {
        Self {
            tree: false,
            only_modified: true,
            ignore_deactivated: true,
        }
    }
}

impl ActivationOptions {
    pub fn tree() -> Self {
        Self {
            tree: true,
            ..Self::default()
        }
    }
}

impl<T: Transport + 'static> RepositoryClient<T> {
    /// Publishes a node, or its whole tree, to the serving instances.
    pub async fn activate_node(
        &self,
        path: &str,
        options: ActivationOptions,
    ) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);

        if options.tree {
            info!("Activating tree '{}'", path);
            let mut form = FormParams::new();
            form.insert("path".to_string(), path.to_string());
            form.insert(CHARSET.to_string(), "UTF-8".to_string());
            form.insert("onlymodified".to_string(), options.only_modified.to_string());
            form.insert(
                "ignoredeactivated".to_string(),
                options.ignore_deactivated.to_string(),
            );
            form.insert("cmd".to_string(), "activate".to_string());
            if let Some(token) = self.token().await? {
                form.insert(FORM_TOKEN.to_string(), token);
            }
            merge(&mut form, &self.config().tree_activation_params);

            let url = self.endpoints().tree_activation.clone();
            self.post_form(url, &form).await?;
        } else {
            info!("Activating node '{}'", path);
            self.replicate(path, "replicate", &self.config().activation_params)
                .await?;
        }

        self.node(path).await
    }

    /// Withdraws a node from the serving instances.
    pub async fn deactivate_node(&self, path: &str) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);

        info!("Deactivating node '{}'", path);
        self.replicate(path, "replicatedelete", &self.config().deactivation_params)
            .await?;
        self.node(path).await
    }

    /// Creates a labelled version of a page.
    pub async fn create_version(
        &self,
        path: &str,
        label: &str,
        comment: &str,
    ) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);

        info!("Creating version '{}' of '{}'", label, path);
        let mut form = FormParams::new();
        form.insert(CHARSET.to_string(), "utf-8".to_string());
        form.insert(":status".to_string(), "browser".to_string());
        form.insert("cmd".to_string(), "createVersion".to_string());
        form.insert("label".to_string(), label.to_string());
        form.insert("comment".to_string(), comment.to_string());
        form.insert("path".to_string(), path.to_string());

        let url = self.endpoints().page_version.clone();
        self.post_form(url, &form).await?;
        self.node(path).await
    }

    async fn replicate(
        &self,
        path: &str,
        action: &str,
        params: &FormParams,
    ) -> Result<(), ClientError> {
        let mut form = FormParams::new();
        form.insert("path".to_string(), path.to_string());
        form.insert(CHARSET.to_string(), "UTF-8".to_string());
        form.insert("action".to_string(), action.to_string());
        merge(&mut form, params);
        if let Some(token) = self.token().await? {
            form.insert(FORM_TOKEN.to_string(), token);
        }

        let url = self.endpoints().replication.clone();
        self.post_form(url, &form).await?;
        Ok(())
    }
}

/// Later entries override earlier ones but keep the original field position.
fn merge(form: &mut FormParams, params: &FormParams) {
    for (key, value) in params {
        match form.get_mut(key) {
            Some(existing) => *existing = value.clone(),
            None => {
                form.insert(key.clone(), value.clone());
            }
        }
    }
}
