use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Progress snapshot emitted while a blob uploads.
#[derive(Debug, Clone, Copy)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Remote blob storage: content-addressed by caller-chosen key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `data` under `key`, reporting progress snapshots on
    /// `progress` along the way. Resolves to a publicly fetchable URL.
    /// A dropped progress receiver must not fail the upload.
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<String>;

    /// URL for a previously uploaded blob.
    async fn download_url(&self, key: &str) -> Result<String>;
}
