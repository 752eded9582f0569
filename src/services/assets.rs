use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur when interacting with the asset store
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or project")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// A stored binary with the metadata needed to serve it back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Asset {
    pub fn jpeg(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "image/jpeg".to_string(),
            bytes,
        }
    }
}

/// Binary storage keyed by an opaque handle
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist `asset`, returning the handle to fetch it by
    async fn store(&self, asset: Asset) -> Result<String, AssetError>;

    async fn fetch(&self, handle: &str) -> Result<Asset, AssetError>;

    async fn delete(&self, handle: &str) -> Result<(), AssetError>;
}

/// Appwrite Storage client
///
/// Images live in a single bucket. The file id doubles as the handle, and
/// files are created with the image filename as their id so handles stay
/// predictable and equal to the `{characterId}_{size}.jpg` filename.
pub struct AppwriteStorage {
    base_url: String,
    api_key: String,
    project_id: String,
    bucket_id: String,
    client: Client,
}

impl AppwriteStorage {
    /// Create a new Appwrite storage client
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        bucket_id: String,
        timeout: Duration,
    ) -> Result<Self, AssetError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            bucket_id,
            client,
        })
    }

    fn files_url(&self) -> String {
        format!(
            "{}/storage/buckets/{}/files",
            self.base_url.trim_end_matches('/'),
            self.bucket_id
        )
    }

    fn file_url(&self, handle: &str) -> String {
        format!("{}/{}", self.files_url(), urlencoding::encode(handle))
    }

    fn check_status(status: StatusCode, handle: &str, action: &str) -> Result<(), AssetError> {
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(AssetError::NotFound(handle.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AssetError::Unauthorized),
            s => Err(AssetError::ApiError(format!("Failed to {} {}: {}", action, handle, s))),
        }
    }
}

/// Appwrite file ids allow `[a-zA-Z0-9._-]` but may not start with a special character
pub fn file_id_for(filename: &str) -> String {
    let id: String = filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .take(36)
        .collect();

    match id.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() => id,
        _ => format!("f{}", id.chars().take(35).collect::<String>()),
    }
}

#[async_trait]
impl AssetStore for AppwriteStorage {
    async fn store(&self, asset: Asset) -> Result<String, AssetError> {
        let file_id = file_id_for(&asset.filename);

        let part = multipart::Part::bytes(asset.bytes)
            .file_name(asset.filename.clone())
            .mime_str(&asset.content_type)?;
        let form = multipart::Form::new()
            .text("fileId", file_id.clone())
            .part("file", part);

        let response = self
            .client
            .post(self.files_url())
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .multipart(form)
            .send()
            .await?;

        Self::check_status(response.status(), &file_id, "store")?;

        let json: Value = response.json().await?;
        let handle = json
            .get("$id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| AssetError::InvalidResponse("Missing $id in file response".into()))?;

        tracing::debug!("Stored asset {} as {}", asset.filename, handle);

        Ok(handle.to_string())
    }

    async fn fetch(&self, handle: &str) -> Result<Asset, AssetError> {
        let response = self
            .client
            .get(format!("{}/view", self.file_url(handle)))
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .send()
            .await?;

        Self::check_status(response.status(), handle, "fetch")?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(Asset {
            filename: handle.to_string(),
            content_type,
            bytes,
        })
    }

    async fn delete(&self, handle: &str) -> Result<(), AssetError> {
        let response = self
            .client
            .delete(self.file_url(handle))
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .send()
            .await?;

        Self::check_status(response.status(), handle, "delete")?;

        tracing::debug!("Deleted asset {}", handle);
        Ok(())
    }
}

/// Process-local asset store; handles are the filenames
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<String, Asset>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn store(&self, asset: Asset) -> Result<String, AssetError> {
        let handle = asset.filename.clone();
        self.assets.write().await.insert(handle.clone(), asset);
        Ok(handle)
    }

    async fn fetch(&self, handle: &str) -> Result<Asset, AssetError> {
        self.assets
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(handle.to_string()))
    }

    async fn delete(&self, handle: &str) -> Result<(), AssetError> {
        self.assets
            .write()
            .await
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| AssetError::NotFound(handle.to_string()))
    }
}
