//! Service configuration.
//!
//! Every setting can be given as a CLI flag or through the environment. Unset
//! collaborator URLs select the local stand-ins: a fixed-answer classifier and
//! a heatmap placeholder that copies the upload.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 5020)]
    pub port: u16,

    /// Maximum request body size for uploads, in megabytes
    #[arg(long, env = "BODY_LIMIT_MB", default_value_t = 5)]
    pub body_limit_mb: usize,

    /// Directory that receives uploads and heatmaps and is served under /uploads
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Model-serving endpoint for classification. Falls back to the stub classifier.
    #[arg(long, env = "CLASSIFIER_URL")]
    pub classifier_url: Option<String>,

    /// Model-serving endpoint for heatmaps. Falls back to the copying placeholder.
    #[arg(long, env = "EXPLAINER_URL")]
    pub explainer_url: Option<String>,

    #[arg(long, env = "STUB_LABEL", default_value = "melanoma")]
    pub stub_label: String,

    #[arg(long, env = "STUB_STAGE", default_value = "II")]
    pub stub_stage: String,

    /// Timeout for each call to a remote collaborator
    #[arg(long, env = "COLLABORATOR_TIMEOUT_SECS", default_value_t = 30)]
    pub collaborator_timeout_secs: u64,
}

impl Config {
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb * 1024 * 1024
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
