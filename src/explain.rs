//! Explainability collaborators. Each one writes a heatmap next to the
//! upload and returns the heatmap's file name within the upload directory.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::storage::{StorageError, UploadStore};
use crate::utils::{post_image, RemoteError};

pub const HEATMAP_PREFIX: &str = "heatmap_";

#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("image path {0:?} has no file name")]
    NoFileName(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("failed to read heatmap body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("heatmap {0} was not written")]
    MissingArtifact(String),
}

#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(&self, image_path: &Path) -> Result<String, ExplainError>;
}

pub fn heatmap_name(image_path: &Path) -> Result<String, ExplainError> {
    image_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!("{HEATMAP_PREFIX}{n}"))
        .ok_or_else(|| ExplainError::NoFileName(image_path.display().to_string()))
}

/// Stands in for Grad-CAM: the heatmap is a byte copy of the source image.
pub struct PlaceholderExplainer {
    store: UploadStore,
}

impl PlaceholderExplainer {
    pub fn new(store: UploadStore) -> Self {
        PlaceholderExplainer { store }
    }
}

#[async_trait]
impl Explainer for PlaceholderExplainer {
    async fn explain(&self, image_path: &Path) -> Result<String, ExplainError> {
        let name = heatmap_name(image_path)?;
        self.store.copy_into(image_path, &name).await?;
        Ok(name)
    }
}

/// Sends the image to a model-serving endpoint and stores the image it
/// returns as the heatmap.
pub struct RemoteExplainer {
    client: Client,
    url: String,
    store: UploadStore,
}

impl RemoteExplainer {
    pub fn new(client: Client, url: impl Into<String>, store: UploadStore) -> Self {
        RemoteExplainer {
            client,
            url: url.into(),
            store,
        }
    }
}

#[async_trait]
impl Explainer for RemoteExplainer {
    async fn explain(&self, image_path: &Path) -> Result<String, ExplainError> {
        let name = heatmap_name(image_path)?;
        let response = post_image(&self.client, &self.url, image_path, "image/*").await?;
        let body = response.bytes().await.map_err(ExplainError::Body)?;
        self.store.write_new(&name, &body).await?;
        Ok(name)
    }
}
