use snafu::{OptionExt, ensure};
use time::OffsetDateTime;
use tracing::info;

use super::error::{ClientError, MissingPathSnafu, UnsplittablePathSnafu};
use super::repository_client::RepositoryClient;
use super::upload::{FileSource, Upload};
use crate::diff::{MutationBatch, PropertyValue};
use crate::node::ResourceNode;
use crate::path::split_parent;
use crate::transport::{FormPart, MultipartForm, RequestBody, Transport};

const FILE_TYPE: &str = "nt:file";
const RESOURCE_TYPE: &str = "nt:resource";
const CONTENT_NODE: &str = "jcr:content";

const LAST_MODIFIED: &str = "jcr:lastModified";
const LAST_MODIFIED_BY: &str = "jcr:lastModifiedBy";
const MIME_TYPE: &str = "jcr:mimeType";
const DATA: &str = "jcr:data";
const ENCODING: &str = "jcr:encoding";

const ASSET_SUFFIX: &str = ".createasset.html";
const ASSET_FILE_FIELD: &str = "file";
const CHARSET_FIELD: &str = "_charset_";

impl<T: Transport + 'static> RepositoryClient<T> {
    /// Creates an `nt:file` node with a `jcr:content` resource holding the upload.
    pub async fn create_file(
        &self,
        path: &str,
        source: FileSource,
        encoding: Option<&str>,
    ) -> Result<ResourceNode<T>, ClientError> {
        let mut batch = MutationBatch::new();
        batch
            .create_node(path, FILE_TYPE)?
            .create_node(content_path(path), RESOURCE_TYPE)?;

        info!("Creating file '{}'", path);
        self.write_file(path, batch, source, encoding).await
    }

    /// Replaces the content of an existing file node.
    pub async fn update_file(
        &self,
        path: &str,
        source: FileSource,
        encoding: Option<&str>,
    ) -> Result<ResourceNode<T>, ClientError> {
        info!("Updating file '{}'", path);
        self.write_file(path, MutationBatch::new(), source, encoding)
            .await
    }

    pub async fn move_file(
        &self,
        path: &str,
        destination: &str,
    ) -> Result<ResourceNode<T>, ClientError> {
        self.move_node(path, destination).await
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), ClientError> {
        self.remove_node(path).await
    }

    async fn write_file(
        &self,
        path: &str,
        mut batch: MutationBatch,
        source: FileSource,
        encoding: Option<&str>,
    ) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);

        let upload = Upload::resolve(source, path).await?;
        let content = content_path(path);
        batch
            .set_property(
                &content,
                LAST_MODIFIED,
                PropertyValue::Date(OffsetDateTime::now_utc()),
            )?
            .set_property(&content, LAST_MODIFIED_BY, PropertyValue::from(self.username()))?
            .set_property(&content, MIME_TYPE, PropertyValue::String(upload.content_type))?
            .set_property(&content, DATA, PropertyValue::Binary(upload.data))?;
        if let Some(encoding) = encoding {
            batch.set_property(&content, ENCODING, PropertyValue::from(encoding))?;
        }

        self.submit(batch).await?;
        self.node(path).await
    }

    /// Uploads an asset through the asset manager, which also builds its renditions.
    pub async fn create_asset(
        &self,
        path: &str,
        source: FileSource,
    ) -> Result<ResourceNode<T>, ClientError> {
        info!("Creating asset '{}'", path);
        self.upload_asset(path, source).await
    }

    /// Replaces the original of an existing asset.
    pub async fn update_asset(
        &self,
        path: &str,
        source: FileSource,
    ) -> Result<ResourceNode<T>, ClientError> {
        info!("Updating asset '{}'", path);
        self.upload_asset(path, source).await
    }

    pub async fn move_asset(
        &self,
        path: &str,
        destination: &str,
    ) -> Result<ResourceNode<T>, ClientError> {
        self.move_node(path, destination).await
    }

    pub async fn remove_asset(&self, path: &str) -> Result<(), ClientError> {
        self.remove_node(path).await
    }

    async fn upload_asset(
        &self,
        path: &str,
        source: FileSource,
    ) -> Result<ResourceNode<T>, ClientError> {
        ensure!(!path.is_empty(), MissingPathSnafu);
        let (parent, name) = split_parent(path).context(UnsplittablePathSnafu { path })?;
        let upload = Upload::resolve(source, path).await?;

        let mut form = MultipartForm::new();
        form.push(FormPart::file(
            ASSET_FILE_FIELD,
            name,
            upload.content_type,
            upload.data,
        ))
        .push(FormPart::text(CHARSET_FIELD, "utf-8"));

        let url = format!("{}{}{}", self.endpoints().instance, parent, ASSET_SUFFIX);
        self.post(url, RequestBody::Multipart(form)).await?;
        self.node(path).await
    }
}

fn content_path(path: &str) -> String {
    format!("{path}/{CONTENT_NODE}")
}
