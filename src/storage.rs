use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage url {0:?}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage responded {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Blob storage for photo assets.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `bytes` under `file_name`, returning the asset's public URL.
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, StorageError>;

    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

/// Last path segment of an asset URL, e.g. `photo-abcd1234.jpg`.
pub fn file_name_for_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

fn content_type(file_name: &str) -> &'static str {
    match file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
    {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Storage over plain HTTP: `PUT {base}/{file}` and `DELETE {url}`.
#[derive(Clone)]
pub struct HttpStorage {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl fmt::Debug for HttpStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStorage")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpStorage {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StorageError> {
        // A trailing slash makes `join` append rather than replace.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|_| StorageError::InvalidUrl(base_url.to_string()))?;
        let http = Client::builder().user_agent("photo-catalog/0.1").build()?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, StorageError> {
        Self::new(&cfg.storage.base_url, cfg.storage.token.clone())
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub fn build_upload_request(&self, bytes: Vec<u8>, file_name: &str) -> Result<reqwest::Request, StorageError> {
        let endpoint = self
            .base_url
            .join(file_name)
            .map_err(|_| StorageError::InvalidUrl(file_name.to_string()))?;
        Ok(self
            .authorize(self.http.put(endpoint))
            .header("Content-Type", content_type(file_name))
            .body(bytes)
            .build()?)
    }

    pub fn build_delete_request(&self, url: &str) -> Result<reqwest::Request, StorageError> {
        let target = Url::parse(url).map_err(|_| StorageError::InvalidUrl(url.to_string()))?;
        Ok(self.authorize(self.http.delete(target)).build()?)
    }

    async fn send(&self, request: reqwest::Request) -> Result<(), StorageError> {
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(StorageError::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for HttpStorage {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, StorageError> {
        let size = bytes.len();
        let request = self.build_upload_request(bytes, file_name)?;
        let url = request.url().to_string();
        self.send(request).await?;
        info!(%url, size, "uploaded asset");
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let request = self.build_delete_request(url)?;
        self.send(request).await?;
        info!(%url, "deleted asset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(
            file_name_for_url("https://blob.example.com/photos/photo-abcd1234.jpg").as_deref(),
            Some("photo-abcd1234.jpg")
        );
        assert_eq!(file_name_for_url("not a url"), None);
    }

    #[test]
    fn upload_request_targets_base_and_authorizes() {
        let storage = HttpStorage::new("https://blob.example.com/photos", Some("secret".into())).unwrap();
        let request = storage.build_upload_request(vec![1, 2, 3], "photo-abcd1234.jpg").unwrap();
        assert_eq!(request.method(), reqwest::Method::PUT);
        assert_eq!(
            request.url().as_str(),
            "https://blob.example.com/photos/photo-abcd1234.jpg"
        );
        let headers = request.headers();
        assert_eq!(
            headers.get("Authorization").and_then(|h| h.to_str().ok()),
            Some("Bearer secret")
        );
        assert_eq!(
            headers.get("Content-Type").and_then(|h| h.to_str().ok()),
            Some("image/jpeg")
        );
    }

    #[test]
    fn delete_request_without_token_has_no_auth() {
        let storage = HttpStorage::new("https://blob.example.com/", None).unwrap();
        let request = storage
            .build_delete_request("https://blob.example.com/photo-abcd1234.png")
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::DELETE);
        assert!(request.headers().get("Authorization").is_none());
        assert!(matches!(
            storage.build_delete_request("::"),
            Err(StorageError::InvalidUrl(_))
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let storage = HttpStorage::new("https://blob.example.com", Some("secret".into())).unwrap();
        assert!(!format!("{storage:?}").contains("secret"));
    }
}
