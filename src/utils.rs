use std::{path::Path, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client, Response,
};

pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// Failures of a call to a remote model-serving endpoint.
#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// Sends the raw bytes of the image at `path` to `url` and returns the
/// response when its status is a success.
pub async fn post_image(
    client: &Client,
    url: &str,
    path: &Path,
    accept: &'static str,
) -> Result<Response, RemoteError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| RemoteError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut header_map = HeaderMap::new();
    header_map.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    header_map.insert(ACCEPT, HeaderValue::from_static(accept));

    let response = client
        .post(url)
        .headers(header_map)
        .body(bytes)
        .send()
        .await
        .map_err(|source| RemoteError::Request {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(RemoteError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    Ok(response)
}
