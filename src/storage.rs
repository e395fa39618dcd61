//! Receipt storage.

use std::collections::HashMap;
use std::sync::atomic::{ AtomicU32, Ordering };
use std::time::Duration;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ AppError, Result };

const UPLOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EXTENSION: &str = "bin";

/// Proof-of-payment file submitted with an approval.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub bytes: Vec<u8>,
    pub extension: String,
}

impl Receipt {
    pub fn new(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AppError::InvalidInput("Receipt file is empty".to_string()));
        }

        Ok(Self {
            bytes,
            extension: sanitize_extension(extension),
        })
    }

    pub fn content_type(&self) -> &'static str {
        match self.extension.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "pdf" => "application/pdf",
            _ => "application/octet-stream",
        }
    }
}

fn sanitize_extension(extension: Option<&str>) -> String {
    extension
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Object key of a receipt: `{id}-receipt-{unix millis}.{ext}`.
pub fn receipt_key(owner_id: Uuid, extension: &str, now: DateTime<Utc>) -> String {
    format!("{}-receipt-{}.{}", owner_id, now.timestamp_millis(), extension)
}

#[async_trait]
pub trait ReceiptStorage: Send + Sync {
    /// Stores the bytes under `key` and returns their public URL.
    async fn upload(&self, key: &str, receipt: &Receipt) -> Result<String>;
}

/// Uploads receipts with an HTTP `PUT` to an object store.
pub struct HttpReceiptStorage {
    client: reqwest::Client,
    upload_url: String,
    public_url: String,
    api_key: Option<String>,
}

impl HttpReceiptStorage {
    pub fn new(upload_url: String, public_url: String, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            upload_url: upload_url.trim_end_matches('/').to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ReceiptStorage for HttpReceiptStorage {
    async fn upload(&self, key: &str, receipt: &Receipt) -> Result<String> {
        let url = format!("{}/{}", self.upload_url, key);

        let mut request = self.client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, receipt.content_type())
            .body(receipt.bytes.clone());

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send().await
            .map_err(|e| AppError::UploadFailed(format!("{}: {}", key, e)))?;

        if !response.status().is_success() {
            return Err(
                AppError::UploadFailed(format!("{}: storage returned status {}", key, response.status()))
            );
        }

        debug!(key, bytes = receipt.bytes.len(), "receipt uploaded");
        Ok(format!("{}/{}", self.public_url, key))
    }
}

/// Keeps receipts in process memory. Used in tests and database-less runs.
#[derive(Default)]
pub struct MemoryReceiptStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    failures: AtomicU32,
}

impl MemoryReceiptStorage {
    pub const URL_PREFIX: &'static str = "memory://receipts";

    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` uploads fail.
    pub fn fail_next(&self, times: u32) {
        self.failures.store(times, Ordering::SeqCst);
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ReceiptStorage for MemoryReceiptStorage {
    async fn upload(&self, key: &str, receipt: &Receipt) -> Result<String> {
        let failing = self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::UploadFailed(format!("{}: injected failure", key)));
        }

        self.objects.write().await.insert(key.to_string(), receipt.bytes.clone());
        Ok(format!("{}/{}", Self::URL_PREFIX, key))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_receipt_key_format() {
        let id = Uuid::nil();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            receipt_key(id, "png", at),
            "00000000-0000-0000-0000-000000000000-receipt-1700000000123.png"
        );
    }

    #[test]
    fn test_extension_is_sanitized() {
        assert_eq!(sanitize_extension(Some(".PNG")), "png");
        assert_eq!(sanitize_extension(Some("../etc")), DEFAULT_EXTENSION);
        assert_eq!(sanitize_extension(None), DEFAULT_EXTENSION);
    }

    #[test]
    fn test_empty_receipt_is_rejected() {
        assert!(matches!(Receipt::new(Vec::new(), Some("jpg")), Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_memory_storage_fails_on_demand() {
        let storage = MemoryReceiptStorage::new();
        let receipt = Receipt::new(vec![1, 2, 3], Some("jpg")).unwrap();

        storage.fail_next(1);
        assert!(matches!(storage.upload("a.jpg", &receipt).await, Err(AppError::UploadFailed(_))));

        let url = storage.upload("a.jpg", &receipt).await.unwrap();
        assert_eq!(url, "memory://receipts/a.jpg");
        assert_eq!(storage.get("a.jpg").await, Some(vec![1, 2, 3]));
    }
}
