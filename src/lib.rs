//! Image upload service for skin lesion classification.
//!
//! `POST /predict` stores an uploaded image, asks a classifier for a label and
//! stage, and asks an explainer for a heatmap. Stored images and heatmaps are
//! served back under `/uploads`.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub mod config;
pub mod errors;
pub mod explain;
pub mod handlers;
pub mod model;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use errors::Error;

use explain::{Explainer, PlaceholderExplainer, RemoteExplainer};
use model::{Classifier, RemoteClassifier, StubClassifier};
use storage::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub store: UploadStore,
    pub classifier: Arc<dyn Classifier>,
    pub explainer: Arc<dyn Explainer>,
}

impl AppState {
    pub fn new(
        store: UploadStore,
        classifier: Arc<dyn Classifier>,
        explainer: Arc<dyn Explainer>,
    ) -> Self {
        AppState {
            store,
            classifier,
            explainer,
        }
    }

    /// Opens the upload directory and picks remote collaborators when their
    /// URLs are configured, local stand-ins otherwise.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = UploadStore::open(&config.upload_dir).await?;
        let client = utils::build_client(config.collaborator_timeout())?;

        let classifier: Arc<dyn Classifier> = match &config.classifier_url {
            Some(url) => {
                tracing::info!(%url, "using remote classifier");
                Arc::new(RemoteClassifier::new(client.clone(), url.clone()))
            }
            None => {
                tracing::warn!(
                    label = %config.stub_label,
                    stage = %config.stub_stage,
                    "CLASSIFIER_URL not set, using stub classifier"
                );
                Arc::new(StubClassifier::new(&config.stub_label, &config.stub_stage))
            }
        };

        let explainer: Arc<dyn Explainer> = match &config.explainer_url {
            Some(url) => {
                tracing::info!(%url, "using remote explainer");
                Arc::new(RemoteExplainer::new(client, url.clone(), store.clone()))
            }
            None => {
                tracing::warn!("EXPLAINER_URL not set, heatmaps are copies of the upload");
                Arc::new(PlaceholderExplainer::new(store.clone()))
            }
        };

        Ok(AppState::new(store, classifier, explainer))
    }
}

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .route("/uploads/{*path}", get(handlers::serve_upload))
        .with_state(state)
        .route("/health", get(handlers::health_check))
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
