use axum::{
    extract::{multipart::MultipartRejection, rejection::PathRejection, Multipart, Path, State},
    http::{header, Uri},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::explain::ExplainError;
use crate::model::Prediction;
use crate::storage::UploadedImage;
use crate::AppState;

const IMAGE_FIELD: &str = "image";

#[derive(Serialize, Deserialize, Debug)]
pub struct PredictResponse {
    pub prediction: Prediction,
    /// Heatmap file name, served under `/uploads/`
    pub heatmap: String,
    /// Storage name of the uploaded image, served under `/uploads/`
    pub image: String,
    /// Client-supplied file name, without directory components
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
}

pub async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, Error> {
    let upload = read_upload(multipart?).await?;
    let stored = state.store.save(&upload).await?;

    tracing::info!(
        image = %stored.name,
        original = stored.original_filename.as_deref().unwrap_or("-"),
        size = stored.size,
        "received upload"
    );

    let prediction = state
        .classifier
        .classify(&stored.path)
        .await
        .map_err(|source| Error::Classification {
            image: stored.name.clone(),
            source,
        })?;

    let heatmap = state
        .explainer
        .explain(&stored.path)
        .await
        .map_err(|source| Error::Explainability {
            image: stored.name.clone(),
            source,
        })?;

    if !state.store.exists(&heatmap).await {
        return Err(Error::Explainability {
            image: stored.name,
            source: ExplainError::MissingArtifact(heatmap),
        });
    }

    tracing::info!(
        image = %stored.name,
        label = %prediction.label,
        stage = %prediction.stage,
        %heatmap,
        "prediction complete"
    );

    Ok(Json(PredictResponse {
        prediction,
        heatmap,
        image: stored.name,
        filename: stored.original_filename,
    }))
}

/// Takes the first `image` field of the form; other fields are skipped.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedImage, Error> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::validation("The `image` field is empty"));
        }

        return UploadedImage::detect(bytes, file_name.as_deref())
            .ok_or_else(|| Error::validation("The `image` field is not a supported image format"));
    }

    Err(Error::validation("Missing `image` field"))
}

pub async fn serve_upload(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, Error> {
    let Path(path) = path?;
    let bytes = state.store.read(&path).await?;
    let content_type = mime_guess::from_path(&path).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, content_type.to_string())], bytes))
}

/// Fallback for unmatched routes, so they answer with the JSON error body too.
pub async fn not_found(uri: Uri) -> Error {
    Error::NotFound(uri.path().to_string())
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}
