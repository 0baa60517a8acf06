use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::PathRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::explain::ExplainError;
use crate::model::ClassificationError;
use crate::storage::StorageError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or unusable upload, or a malformed request path
    #[error("{message}")]
    Validation { message: String },

    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error("classification of {image} failed: {source}")]
    Classification {
        image: String,
        #[source]
        source: ClassificationError,
    },

    #[error("heatmap for {image} failed: {source}")]
    Explainability {
        image: String,
        #[source]
        source: ExplainError,
    },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Classification { .. } | Error::Explainability { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::PayloadTooLarge => "payload_too_large",
            Error::NotFound(_) => "not_found",
            Error::Storage(_) => "storage",
            Error::Classification { .. } => "classification",
            Error::Explainability { .. } => "explainability",
        }
    }

    /// Message safe to show to clients: no paths, URLs or upstream bodies.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::PayloadTooLarge => self.to_string(),
            Error::NotFound(name) => format!("{name} not found"),
            Error::Storage(_) => "Failed to store file".to_string(),
            Error::Classification { .. } => "Upstream processing failed: classification".to_string(),
            Error::Explainability { .. } => "Upstream processing failed: heatmap generation".to_string(),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(path) => Error::validation(format!("Invalid path {path:?}")),
            StorageError::NotFound(name) => Error::NotFound(name),
            other => Error::Storage(other),
        }
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge
        } else {
            Error::validation(err.body_text())
        }
    }
}

impl From<MultipartRejection> for Error {
    fn from(rejection: MultipartRejection) -> Self {
        Error::validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Storage(_) => tracing::error!("Storage error: {:#}", self),
            Error::Classification { .. } | Error::Explainability { .. } => {
                tracing::warn!("Collaborator error: {:#}", self)
            }
            Error::Validation { .. } | Error::PayloadTooLarge | Error::NotFound(_) => {
                tracing::debug!("Client error: {}", self)
            }
        }

        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.user_message(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::path::PathBuf;

    async fn render(err: Error) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_body() {
        let (status, body) = render(Error::validation("Missing `image` field")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"error": {"kind": "validation", "message": "Missing `image` field"}})
        );
    }

    #[tokio::test]
    async fn test_storage_error_hides_path() {
        let err = Error::from(StorageError::Io {
            op: "write",
            path: PathBuf::from("/srv/secret/uploads/x.png"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        });

        let (status, body) = render(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "storage");
        assert!(!body.to_string().contains("/srv/secret"));
    }

    #[tokio::test]
    async fn test_collaborator_errors_are_bad_gateway() {
        let classification = Error::Classification {
            image: "a.png".into(),
            source: ClassificationError::Malformed("bad".into()),
        };
        let explainability = Error::Explainability {
            image: "a.png".into(),
            source: ExplainError::MissingArtifact("heatmap_a.png".into()),
        };

        let (status, body) = render(classification).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["kind"], "classification");

        let (status, body) = render(explainability).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["kind"], "explainability");
    }

    #[test]
    fn test_storage_error_mapping() {
        assert_eq!(
            Error::from(StorageError::NotFound("a.png".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::from(StorageError::InvalidPath("../a".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
