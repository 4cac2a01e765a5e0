//! Media upload boundary (§6): each configured service can store bytes and
//! hand back a URL that survives longer than a signed CDN link.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned an unexpected response: {0}")]
    BadResponse(String),
}

/// One successful upload: the new URL, plus an expiry if the service imposes one.
pub struct UploadResult {
    pub url: String,
    pub expiry_timestamp: Option<i64>,
}

#[async_trait]
pub trait UploadService: Send + Sync {
    fn name(&self) -> &str;
    /// Permanent services never expire; temporary ones return an expiry from [`Self::upload`].
    fn is_permanent(&self) -> bool;
    async fn upload(&self, bytes: Vec<u8>, filename: &str, timeout_secs: u64) -> Result<UploadResult, UploadError>;
}

/// catbox.moe — permanent hosting, optional userhash for account-owned uploads.
pub struct CatboxPermanentService {
    client: reqwest::Client,
    user_hash: Option<String>,
}

impl CatboxPermanentService {
    pub fn new(client: reqwest::Client, user_hash: Option<String>) -> Self {
        Self { client, user_hash }
    }
}

#[async_trait]
impl UploadService for CatboxPermanentService {
    fn name(&self) -> &str {
        "catbox"
    }

    fn is_permanent(&self) -> bool {
        true
    }

    async fn upload(&self, bytes: Vec<u8>, filename: &str, timeout_secs: u64) -> Result<UploadResult, UploadError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let mut form = reqwest::multipart::Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);
        if let Some(hash) = &self.user_hash {
            form = form.text("userhash", hash.clone());
        }

        let resp = self
            .client
            .post("https://catbox.moe/user/api.php")
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let text = resp.text().await?;
        let url = text.trim().to_string();
        if !url.starts_with("http") {
            return Err(UploadError::BadResponse(url));
        }
        Ok(UploadResult {
            url,
            expiry_timestamp: None,
        })
    }
}

/// pixeldrain.com — permanent hosting, authenticated PUT keyed by filename.
pub struct PixeldrainPermanentService {
    client: reqwest::Client,
    api_key: String,
}

impl PixeldrainPermanentService {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl UploadService for PixeldrainPermanentService {
    fn name(&self) -> &str {
        "pixeldrain"
    }

    fn is_permanent(&self) -> bool {
        true
    }

    async fn upload(&self, bytes: Vec<u8>, filename: &str, timeout_secs: u64) -> Result<UploadResult, UploadError> {
        let resp = self
            .client
            .put(format!("https://pixeldrain.com/api/file/{filename}"))
            .basic_auth("", Some(&self.api_key))
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| UploadError::BadResponse(e.to_string()))?;
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| UploadError::BadResponse("missing id field".to_string()))?;
        Ok(UploadResult {
            url: format!("https://pixeldrain.com/api/file/{id}"),
            expiry_timestamp: None,
        })
    }
}

/// litterbox.catbox.moe — temporary hosting, fixed 72h retention.
pub struct LitterboxTemporaryService {
    client: reqwest::Client,
}

impl LitterboxTemporaryService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UploadService for LitterboxTemporaryService {
    fn name(&self) -> &str {
        "litterbox"
    }

    fn is_permanent(&self) -> bool {
        false
    }

    async fn upload(&self, bytes: Vec<u8>, filename: &str, timeout_secs: u64) -> Result<UploadResult, UploadError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("reqtype", "fileupload")
            .text("time", "72h")
            .part("fileToUpload", part);

        let resp = self
            .client
            .post("https://litterbox.catbox.moe/resources/internals/api.php")
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let text = resp.text().await?;
        let url = text.trim().to_string();
        if !url.starts_with("http") {
            return Err(UploadError::BadResponse(url));
        }
        let expiry = chrono::Utc::now().timestamp() + 72 * 3600;
        Ok(UploadResult {
            url,
            expiry_timestamp: Some(expiry),
        })
    }
}
