//! Classification collaborators.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{post_image, RemoteError};

/// Category and stage reported by a classifier. `stage` is passed through
/// exactly as the classifier returns it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub label: String,
    pub stage: String,
}

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("image {} is not readable: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("malformed prediction: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image_path: &Path) -> Result<Prediction, ClassificationError>;
}

/// Answers every readable image with the same prediction.
pub struct StubClassifier {
    prediction: Prediction,
}

impl StubClassifier {
    pub fn new(label: impl Into<String>, stage: impl Into<String>) -> Self {
        StubClassifier {
            prediction: Prediction {
                label: label.into(),
                stage: stage.into(),
            },
        }
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, image_path: &Path) -> Result<Prediction, ClassificationError> {
        tokio::fs::File::open(image_path)
            .await
            .map_err(|source| ClassificationError::Unreadable {
                path: image_path.to_path_buf(),
                source,
            })?;
        Ok(self.prediction.clone())
    }
}

/// Forwards the image to a model-serving endpoint that replies with
/// `{"label": ..., "stage": ...}`.
pub struct RemoteClassifier {
    client: Client,
    url: String,
}

impl RemoteClassifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        RemoteClassifier {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, image_path: &Path) -> Result<Prediction, ClassificationError> {
        let response = post_image(&self.client, &self.url, image_path, "application/json").await?;

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| ClassificationError::Malformed(e.to_string()))?;

        if prediction.label.trim().is_empty() {
            return Err(ClassificationError::Malformed("empty label".into()));
        }
        Ok(prediction)
    }
}
