use crate::error::{BundleError, Result};
use std::io;
use std::time::Duration;
use url::Url;

/// Retrieves page and asset bodies over `http(s)` or from `file://` paths
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(BundleError::HttpClient)?;
        Ok(Self { client })
    }

    /// Fetch the raw body behind `url`
    pub async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| BundleError::Io {
                    action: "resolve",
                    path: url.path().into(),
                    source: io::Error::from(io::ErrorKind::InvalidInput),
                })?;
                tokio::fs::read(&path)
                    .await
                    .map_err(BundleError::io("read", &path))
            }
            "http" | "https" => {
                let fetch_error = |source| BundleError::Fetch {
                    url: url.to_string(),
                    source,
                };
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(fetch_error)?;
                let body = response.bytes().await.map_err(fetch_error)?;
                Ok(body.to_vec())
            }
            other => Err(BundleError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Fetch `url` as text, replacing invalid UTF-8
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        let body = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
