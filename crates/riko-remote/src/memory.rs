use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast, mpsc};

use riko_core::Identity;

use crate::blob::{BlobStore, TransferProgress};
use crate::document::{ConversationStore, DocumentSnapshot, Revision};
use crate::error::{RemoteError, Result};
use crate::identity::IdentityProvider;

const FEED_CAPACITY: usize = 64;
const UPLOAD_CHUNK: usize = 64 * 1024;

struct StoredDocument {
    revision: Revision,
    data: serde_json::Value,
}

/// In-process stand-in for the hosted backend: revisioned documents
/// with per-conversation change feeds, a blob map with chunked upload
/// progress, and a single mutable identity. Backs the CLI and the
/// test suite.
pub struct MemoryRemote {
    identity: RwLock<Identity>,
    documents: RwLock<HashMap<String, StoredDocument>>,
    feeds: RwLock<HashMap<String, broadcast::Sender<DocumentSnapshot>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryRemote {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: RwLock::new(identity),
            documents: RwLock::new(HashMap::new()),
            feeds: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    async fn feed(&self, conversation_id: &str) -> broadcast::Sender<DocumentSnapshot> {
        let mut feeds = self.feeds.write().await;
        feeds
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryRemote {
    async fn load(&self, conversation_id: &str) -> Result<Option<DocumentSnapshot>> {
        let documents = self.documents.read().await;
        Ok(documents.get(conversation_id).map(|doc| DocumentSnapshot {
            conversation_id: conversation_id.to_string(),
            revision: doc.revision,
            data: doc.data.clone(),
        }))
    }

    async fn store(
        &self,
        conversation_id: &str,
        data: serde_json::Value,
        expected: Option<Revision>,
    ) -> Result<Revision> {
        let snapshot = {
            let mut documents = self.documents.write().await;
            let current = documents
                .get(conversation_id)
                .map(|doc| doc.revision)
                .unwrap_or_default();

            if let Some(expected) = expected {
                if expected != current {
                    return Err(RemoteError::RevisionConflict {
                        conversation_id: conversation_id.to_string(),
                        expected,
                        found: current,
                    });
                }
            }

            let revision = Revision(current.0 + 1);
            documents.insert(
                conversation_id.to_string(),
                StoredDocument {
                    revision,
                    data: data.clone(),
                },
            );

            DocumentSnapshot {
                conversation_id: conversation_id.to_string(),
                revision,
                data,
            }
        };

        let revision = snapshot.revision;
        // No receivers is fine; the send result only signals that.
        let _ = self.feed(conversation_id).await.send(snapshot);

        tracing::debug!(conversation_id = %conversation_id, revision = %revision, "Stored document");
        Ok(revision)
    }

    async fn watch(&self, conversation_id: &str) -> broadcast::Receiver<DocumentSnapshot> {
        self.feed(conversation_id).await.subscribe()
    }
}

#[async_trait]
impl BlobStore for MemoryRemote {
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<String> {
        let total_bytes = data.len() as u64;
        let mut bytes_transferred = 0u64;

        for chunk in data.chunks(UPLOAD_CHUNK) {
            bytes_transferred += chunk.len() as u64;
            let _ = progress
                .send(TransferProgress {
                    bytes_transferred,
                    total_bytes,
                })
                .await;
        }

        if data.is_empty() {
            let _ = progress
                .send(TransferProgress {
                    bytes_transferred: 0,
                    total_bytes: 0,
                })
                .await;
        }

        self.blobs.write().await.insert(key.to_string(), data);

        tracing::debug!(key = %key, bytes = total_bytes, "Stored blob");
        self.download_url(key).await
    }

    async fn download_url(&self, key: &str) -> Result<String> {
        let blobs = self.blobs.read().await;
        if !blobs.contains_key(key) {
            return Err(RemoteError::BlobNotFound(key.to_string()));
        }
        Ok(format!("memory://blobs/{key}"))
    }
}

#[async_trait]
impl IdentityProvider for MemoryRemote {
    async fn current_identity(&self) -> Result<Identity> {
        Ok(self.identity.read().await.clone())
    }

    async fn update_display_name(&self, display_name: &str) -> Result<()> {
        self.identity.write().await.display_name = display_name.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> MemoryRemote {
        MemoryRemote::new(Identity::new("u1", "Ada", "a.png"))
    }

    fn doc(texts: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "messages": texts
                .iter()
                .map(|t| serde_json::json!({
                    "id": *t,
                    "text": *t,
                    "createdAt": 1i64,
                    "sender": { "id": "u1", "name": "Ada", "avatar": "a.png" },
                    "sent": true,
                    "received": false
                }))
                .collect::<Vec<_>>(),
            "lastUpdated": 1i64
        })
    }

    #[tokio::test]
    async fn test_store_assigns_increasing_revisions() {
        let remote = remote();
        let r1 = remote.store("c1", doc(&["a"]), None).await.unwrap();
        let r2 = remote.store("c1", doc(&["a", "b"]), None).await.unwrap();
        assert!(r2 > r1);

        let snapshot = remote.load("c1").await.unwrap().unwrap();
        assert_eq!(snapshot.revision, r2);
    }

    #[tokio::test]
    async fn test_load_missing_document_is_none() {
        assert!(remote().load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conditional_store_detects_conflict() {
        let remote = remote();
        let r1 = remote.store("c1", doc(&["a"]), None).await.unwrap();

        // Write against the revision we just observed: lands.
        let r2 = remote.store("c1", doc(&["a", "b"]), Some(r1)).await.unwrap();

        // Write against the stale revision: rejected.
        let err = remote
            .store("c1", doc(&["a", "c"]), Some(r1))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::RevisionConflict { found, .. } if found == r2));

        // The conflicting write changed nothing.
        let snapshot = remote.load("c1").await.unwrap().unwrap();
        assert_eq!(snapshot.data, doc(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_unconditional_store_is_last_writer_wins() {
        // Two writers read the same base document and each write their
        // own append unconditionally: the earlier append vanishes.
        // This is the vendor's plain `set` behavior; the worker's
        // append path uses conditional writes instead.
        let remote = remote();
        remote.store("c1", doc(&["a"]), None).await.unwrap();

        remote.store("c1", doc(&["a", "b"]), None).await.unwrap();
        remote.store("c1", doc(&["a", "c"]), None).await.unwrap();

        let snapshot = remote.load("c1").await.unwrap().unwrap();
        assert_eq!(snapshot.data, doc(&["a", "c"]));
    }

    #[tokio::test]
    async fn test_watch_delivers_new_snapshots() {
        let remote = remote();
        let mut feed = remote.watch("c1").await;

        remote.store("c1", doc(&["a", "b", "c"]), None).await.unwrap();

        let snapshot = feed.recv().await.unwrap();
        assert_eq!(snapshot.conversation_id, "c1");
        let messages = snapshot.data["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
    }

    #[tokio::test]
    async fn test_upload_reports_progress_and_resolves_url() {
        let remote = remote();
        let (tx, mut rx) = mpsc::channel(16);

        let data = vec![7u8; UPLOAD_CHUNK + 100];
        let url = remote.upload("k1", data, tx).await.unwrap();
        assert!(!url.is_empty());

        let mut last = None;
        while let Some(progress) = rx.recv().await {
            last = Some(progress);
        }
        let last = last.unwrap();
        assert_eq!(last.bytes_transferred, last.total_bytes);
        assert_eq!(last.total_bytes, (UPLOAD_CHUNK + 100) as u64);

        assert_eq!(remote.download_url("k1").await.unwrap(), url);
    }

    #[tokio::test]
    async fn test_download_url_for_unknown_key_fails() {
        let err = remote().download_url("missing").await.unwrap_err();
        assert!(matches!(err, RemoteError::BlobNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_display_name_persists() {
        let remote = remote();
        remote.update_display_name("Ada L.").await.unwrap();
        assert_eq!(remote.current_identity().await.unwrap().display_name, "Ada L.");
    }
}
