//! Where the settings blob is downloaded from.

use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::{Error, Result};

/// Durable storage holding the settings blob.
#[async_trait]
pub trait SettingsSource: Send + Sync + 'static {
    /// Download the raw blob text
    async fn fetch(&self) -> Result<String>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Blob served over HTTP(S), e.g. an object-store URL.
pub struct HttpSettingsSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSettingsSource {
    /// Create a source for `url` using a shared client
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Object-store URL for `bucket`/`key` in `region`
    #[must_use]
    pub fn s3_url(region: &str, bucket: &str, key: &str) -> String {
        format!("https://s3.{region}.amazonaws.com/{bucket}/{key}")
    }
}

#[async_trait]
impl SettingsSource for HttpSettingsSource {
    async fn fetch(&self) -> Result<String> {
        debug!(url = %self.url, "Fetching settings blob");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::upstream("settings", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream("settings", e))?;

        if !status.is_success() {
            return Err(Error::Upstream {
                endpoint: "settings",
                status: Some(status.as_u16()),
                body: storage_error_message(&body),
            });
        }
        Ok(body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Blob on the local filesystem.
pub struct FileSettingsSource {
    path: PathBuf,
}

impl FileSettingsSource {
    /// Create a source reading `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsSource for FileSettingsSource {
    async fn fetch(&self) -> Result<String> {
        debug!(path = %self.path.display(), "Reading settings blob");
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Object stores answer errors with an XML `<Message>` element.
fn storage_error_message(body: &str) -> String {
    static MESSAGE: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"(?is)<message>(.*?)</message>").ok());
    MESSAGE
        .as_ref()
        .and_then(|re| re.captures(body))
        .and_then(|c| c.get(1))
        .map_or_else(|| body.to_string(), |m| m.as_str().to_string())
}
