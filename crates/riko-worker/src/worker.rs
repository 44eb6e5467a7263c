use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use riko_core::{Conversation, Message};
use riko_remote::{BlobStore, ConversationStore, DocumentSnapshot, RemoteError, Revision};

use crate::error::{Result, WorkerError};
use crate::events::ChatEvent;
use crate::session::Session;

const EVENT_CAPACITY: usize = 1000;
const MAX_APPEND_ATTEMPTS: u32 = 5;
const RESUBSCRIBE_BASE_MS: u64 = 500;
const RESUBSCRIBE_CAP_MS: u64 = 30_000;

/// Glue between the UI layer and the remote backend: follows
/// conversation documents, appends messages, uploads attachments and
/// republishes everything as `ChatEvent`s on a single channel.
pub struct ChatWorker {
    documents: Arc<dyn ConversationStore>,
    blobs: Arc<dyn BlobStore>,
    session: Arc<Session>,
    event_tx: mpsc::Sender<ChatEvent>,
    event_rx: Option<mpsc::Receiver<ChatEvent>>,
}

impl ChatWorker {
    pub fn new(
        documents: Arc<dyn ConversationStore>,
        blobs: Arc<dyn BlobStore>,
        session: Arc<Session>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            documents,
            blobs,
            session,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ChatEvent>> {
        self.event_rx.take()
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Publish the current state of a conversation, then follow every
    /// remote change until the returned guard is dropped.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<ConversationGuard> {
        // Subscribe before the initial load so a write landing in
        // between is not missed.
        let feed = self.documents.watch(conversation_id).await;

        match self.documents.load(conversation_id).await? {
            Some(snapshot) => {
                publish_snapshot(&self.event_tx, snapshot).await;
            }
            None => {
                // Nothing stored yet; the view still gets an empty list.
                let _ = self
                    .event_tx
                    .send(ChatEvent::Snapshot {
                        conversation_id: conversation_id.to_string(),
                        messages: Vec::new(),
                    })
                    .await;
            }
        }

        let task = tokio::spawn(follow_conversation(
            self.documents.clone(),
            self.event_tx.clone(),
            conversation_id.to_string(),
            feed,
        ));

        tracing::info!(conversation_id = %conversation_id, "Following conversation");
        Ok(ConversationGuard {
            conversation_id: conversation_id.to_string(),
            task,
        })
    }

    /// Append one text message, stamped with the session's sender
    /// snapshot. The new list arrives back through the change feed.
    pub async fn send_text(
        &self,
        conversation_id: &str,
        body: impl Into<String>,
    ) -> Result<Message> {
        let message = Message::text(body, self.session.sender().await).outgoing();
        append_with_retry(&self.documents, conversation_id, message.clone()).await?;

        let _ = self
            .event_tx
            .send(ChatEvent::MessageSent {
                conversation_id: conversation_id.to_string(),
                message_id: message.id.clone(),
            })
            .await;
        Ok(message)
    }

    /// Read a local file and upload it under a fresh key, then append
    /// an image message with the resolved URL. Runs in its own task so
    /// a concurrent text send is never blocked; progress and the
    /// terminal outcome arrive as `Upload*` events. Returns the key.
    pub async fn send_attachment(
        &self,
        conversation_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<String> {
        let data = tokio::fs::read(path.as_ref()).await?;
        let key = Uuid::new_v4().to_string();

        tokio::spawn(run_upload(
            self.documents.clone(),
            self.blobs.clone(),
            self.session.clone(),
            self.event_tx.clone(),
            conversation_id.to_string(),
            key.clone(),
            data,
        ));

        Ok(key)
    }
}

/// Keeps a conversation's change-feed task alive; dropping the guard
/// releases the subscription.
pub struct ConversationGuard {
    conversation_id: String,
    task: JoinHandle<()>,
}

impl ConversationGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        tracing::debug!(conversation_id = %self.conversation_id, "Releasing subscription");
        self.task.abort();
    }
}

async fn follow_conversation(
    documents: Arc<dyn ConversationStore>,
    event_tx: mpsc::Sender<ChatEvent>,
    conversation_id: String,
    mut feed: broadcast::Receiver<DocumentSnapshot>,
) {
    let mut attempt = 0u32;
    loop {
        loop {
            match feed.recv().await {
                Ok(snapshot) => {
                    attempt = 0;
                    if !publish_snapshot(&event_tx, snapshot).await {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Intermediate snapshots are worthless; only the
                    // newest document state matters after a lag.
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        missed,
                        "Change feed lagged, refetching latest"
                    );
                    match documents.load(&conversation_id).await {
                        Ok(Some(snapshot)) => {
                            if !publish_snapshot(&event_tx, snapshot).await {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            tracing::warn!(
                                conversation_id = %conversation_id,
                                error = %err,
                                "Refetch after lag failed"
                            );
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        tracing::warn!(conversation_id = %conversation_id, attempt, "Subscription lost, re-arming");
        if event_tx
            .send(ChatEvent::SubscriptionLost {
                conversation_id: conversation_id.clone(),
                reason: "change feed closed".to_string(),
            })
            .await
            .is_err()
        {
            return;
        }

        tokio::time::sleep(resubscribe_delay(attempt)).await;
        attempt = attempt.saturating_add(1);

        feed = documents.watch(&conversation_id).await;

        // Catch up on whatever was written while unsubscribed.
        match documents.load(&conversation_id).await {
            Ok(Some(snapshot)) => {
                if !publish_snapshot(&event_tx, snapshot).await {
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "Catch-up load failed"
                );
            }
        }

        if event_tx
            .send(ChatEvent::Resubscribed {
                conversation_id: conversation_id.clone(),
            })
            .await
            .is_err()
        {
            return;
        }
    }
}

/// Decode, normalize, publish. Returns false once the consumer has
/// dropped the event receiver.
async fn publish_snapshot(event_tx: &mpsc::Sender<ChatEvent>, snapshot: DocumentSnapshot) -> bool {
    match decode_document(&snapshot) {
        Ok(mut conversation) => {
            conversation.normalize();
            event_tx
                .send(ChatEvent::Snapshot {
                    conversation_id: snapshot.conversation_id,
                    messages: conversation.messages,
                })
                .await
                .is_ok()
        }
        Err(err) => {
            tracing::error!(
                conversation_id = %snapshot.conversation_id,
                error = %err,
                "Dropping malformed snapshot"
            );
            event_tx
                .send(ChatEvent::Error {
                    conversation_id: Some(snapshot.conversation_id),
                    error: err.to_string(),
                })
                .await
                .is_ok()
        }
    }
}

/// Read-modify-write with a revision guard: reload and retry on
/// conflict so a concurrent append is never silently dropped.
async fn append_with_retry(
    documents: &Arc<dyn ConversationStore>,
    conversation_id: &str,
    message: Message,
) -> Result<()> {
    for attempt in 1..=MAX_APPEND_ATTEMPTS {
        let (mut conversation, expected) = match documents.load(conversation_id).await? {
            Some(snapshot) => {
                let revision = snapshot.revision;
                (decode_document(&snapshot)?, revision)
            }
            None => (Conversation::default(), Revision::default()),
        };

        conversation.normalize();
        conversation.append(message.clone());
        let data = serde_json::to_value(&conversation)?;

        match documents.store(conversation_id, data, Some(expected)).await {
            Ok(revision) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    revision = %revision,
                    message_id = %message.id,
                    "Appended message"
                );
                return Ok(());
            }
            Err(RemoteError::RevisionConflict { found, .. }) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    attempt,
                    found = %found,
                    "Concurrent append, reloading"
                );
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(WorkerError::AppendContention {
        conversation_id: conversation_id.to_string(),
        attempts: MAX_APPEND_ATTEMPTS,
    })
}

async fn run_upload(
    documents: Arc<dyn ConversationStore>,
    blobs: Arc<dyn BlobStore>,
    session: Arc<Session>,
    event_tx: mpsc::Sender<ChatEvent>,
    conversation_id: String,
    key: String,
    data: Vec<u8>,
) {
    let _ = event_tx
        .send(ChatEvent::UploadStarted { key: key.clone() })
        .await;

    let (progress_tx, mut progress_rx) = mpsc::channel::<riko_remote::TransferProgress>(32);

    let forwarder = {
        let event_tx = event_tx.clone();
        let key = key.clone();
        tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let _ = event_tx
                    .send(ChatEvent::UploadProgress {
                        key: key.clone(),
                        bytes_transferred: progress.bytes_transferred,
                        total_bytes: progress.total_bytes,
                    })
                    .await;
            }
        })
    };

    let result = blobs.upload(&key, data, progress_tx).await;
    let _ = forwarder.await;

    match result {
        Ok(url) => {
            let _ = event_tx
                .send(ChatEvent::UploadCompleted {
                    key: key.clone(),
                    url: url.clone(),
                })
                .await;

            let message = Message::image(url, session.sender().await).outgoing();
            match append_with_retry(&documents, &conversation_id, message.clone()).await {
                Ok(()) => {
                    let _ = event_tx
                        .send(ChatEvent::MessageSent {
                            conversation_id,
                            message_id: message.id,
                        })
                        .await;
                }
                Err(err) => {
                    tracing::error!(
                        conversation_id = %conversation_id,
                        error = %err,
                        "Appending uploaded image failed"
                    );
                    let _ = event_tx
                        .send(ChatEvent::Error {
                            conversation_id: Some(conversation_id),
                            error: err.to_string(),
                        })
                        .await;
                }
            }
        }
        Err(err) => {
            tracing::error!(key = %key, error = %err, "Upload failed");
            let _ = event_tx
                .send(ChatEvent::UploadFailed {
                    key,
                    error: err.to_string(),
                })
                .await;
        }
    }
}

fn decode_document(snapshot: &DocumentSnapshot) -> Result<Conversation> {
    serde_json::from_value(snapshot.data.clone()).map_err(|source| {
        WorkerError::MalformedDocument {
            conversation_id: snapshot.conversation_id.clone(),
            source,
        }
    })
}

fn resubscribe_delay(attempt: u32) -> Duration {
    let delay = RESUBSCRIBE_BASE_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(RESUBSCRIBE_CAP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use riko_core::Identity;
    use riko_remote::{MemoryRemote, TransferProgress};

    fn identity() -> Identity {
        Identity::new("u1", "Ada", "a.png")
    }

    async fn setup() -> (Arc<MemoryRemote>, ChatWorker, mpsc::Receiver<ChatEvent>) {
        let remote = Arc::new(MemoryRemote::new(identity()));
        let session = Session::connect(&*remote).await.unwrap();
        let mut worker = ChatWorker::new(remote.clone(), remote.clone(), session);
        let rx = worker.take_event_receiver().unwrap();
        (remote, worker, rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<ChatEvent>) -> ChatEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event within timeout")
            .expect("event channel closed")
    }

    fn document_with(texts: &[&str]) -> serde_json::Value {
        let mut conversation = Conversation::default();
        for text in texts {
            conversation.append(Message::text(*text, identity().sender()).outgoing());
        }
        serde_json::to_value(&conversation).unwrap()
    }

    async fn stored_conversation(remote: &MemoryRemote, id: &str) -> Conversation {
        let snapshot = remote.load(id).await.unwrap().unwrap();
        serde_json::from_value(snapshot.data).unwrap()
    }

    #[tokio::test]
    async fn test_open_conversation_publishes_initial_empty_snapshot() {
        let (_remote, worker, mut rx) = setup().await;
        let _guard = worker.open_conversation("c1").await.unwrap();

        match next_event(&mut rx).await {
            ChatEvent::Snapshot {
                conversation_id,
                messages,
            } => {
                assert_eq!(conversation_id, "c1");
                assert!(messages.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_change_republishes_full_list() {
        let (remote, worker, mut rx) = setup().await;
        let _guard = worker.open_conversation("c1").await.unwrap();
        let _ = next_event(&mut rx).await; // initial snapshot

        // Another device rewrites the document with three messages.
        remote
            .store("c1", document_with(&["one", "two", "three"]), None)
            .await
            .unwrap();

        match next_event(&mut rx).await {
            ChatEvent::Snapshot { messages, .. } => assert_eq!(messages.len(), 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_text_appends_to_end() {
        let (remote, worker, _rx) = setup().await;
        remote
            .store("c1", document_with(&["one", "two"]), None)
            .await
            .unwrap();

        let sent = worker.send_text("c1", "three").await.unwrap();

        let conversation = stored_conversation(&remote, "c1").await;
        assert_eq!(conversation.len(), 3);
        let last = conversation.messages.last().unwrap();
        assert_eq!(last.id, sent.id);
        assert_eq!(last.text, "three");
        assert!(last.sent);
        assert!(!last.received);
        assert_eq!(last.sender.name, "Ada");
    }

    #[tokio::test]
    async fn test_concurrent_sends_both_survive() {
        let (remote, worker, _rx) = setup().await;

        let (a, b) = tokio::join!(worker.send_text("c1", "first"), worker.send_text("c1", "second"));
        a.unwrap();
        b.unwrap();

        let conversation = stored_conversation(&remote, "c1").await;
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_dropping_guard_releases_subscription() {
        let (remote, worker, mut rx) = setup().await;
        let guard = worker.open_conversation("c1").await.unwrap();
        let _ = next_event(&mut rx).await; // initial snapshot

        drop(guard);
        tokio::time::sleep(Duration::from_millis(50)).await;

        remote
            .store("c1", document_with(&["late"]), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_snapshot_surfaces_as_error_event() {
        let (remote, worker, mut rx) = setup().await;
        let _guard = worker.open_conversation("c1").await.unwrap();
        let _ = next_event(&mut rx).await; // initial snapshot

        remote
            .store("c1", serde_json::json!({ "messages": "not-a-list" }), None)
            .await
            .unwrap();

        match next_event(&mut rx).await {
            ChatEvent::Error {
                conversation_id, ..
            } => assert_eq!(conversation_id.as_deref(), Some("c1")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_attachment_upload_appends_image_message() {
        let (remote, worker, mut rx) = setup().await;

        let path = std::env::temp_dir().join(format!("riko-upload-{}.bin", Uuid::new_v4()));
        tokio::fs::write(&path, vec![7u8; 100_000]).await.unwrap();

        let key = worker.send_attachment("c1", &path).await.unwrap();

        let mut url = None;
        let mut saw_progress = false;
        loop {
            match next_event(&mut rx).await {
                ChatEvent::UploadStarted { key: started } => assert_eq!(started, key),
                ChatEvent::UploadProgress {
                    bytes_transferred,
                    total_bytes,
                    ..
                } => {
                    assert!(bytes_transferred <= total_bytes);
                    saw_progress = true;
                }
                ChatEvent::UploadCompleted { url: resolved, .. } => url = Some(resolved),
                ChatEvent::MessageSent { .. } => break,
                ChatEvent::UploadFailed { error, .. } => panic!("upload failed: {error}"),
                other => panic!("unexpected event: {other:?}"),
            }
        }

        let url = url.expect("no completion event");
        assert!(!url.is_empty());
        assert!(saw_progress);

        let conversation = stored_conversation(&remote, "c1").await;
        let last = conversation.messages.last().unwrap();
        assert_eq!(last.image.as_deref(), Some(url.as_str()));
        assert_eq!(last.text, "");
        assert!(last.sent);

        tokio::fs::remove_file(&path).await.ok();
    }

    struct FailingBlobs;

    #[async_trait::async_trait]
    impl BlobStore for FailingBlobs {
        async fn upload(
            &self,
            _key: &str,
            _data: Vec<u8>,
            _progress: mpsc::Sender<TransferProgress>,
        ) -> riko_remote::Result<String> {
            Err(RemoteError::Backend("storage offline".into()))
        }

        async fn download_url(&self, key: &str) -> riko_remote::Result<String> {
            Err(RemoteError::BlobNotFound(key.to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_upload_reports_terminal_event_and_appends_nothing() {
        let remote = Arc::new(MemoryRemote::new(identity()));
        let session = Session::connect(&*remote).await.unwrap();
        let mut worker = ChatWorker::new(remote.clone(), Arc::new(FailingBlobs), session);
        let mut rx = worker.take_event_receiver().unwrap();

        let path = std::env::temp_dir().join(format!("riko-upload-{}.bin", Uuid::new_v4()));
        tokio::fs::write(&path, b"payload").await.unwrap();

        let key = worker.send_attachment("c1", &path).await.unwrap();

        loop {
            match next_event(&mut rx).await {
                ChatEvent::UploadStarted { .. } | ChatEvent::UploadProgress { .. } => {}
                ChatEvent::UploadFailed { key: failed, error } => {
                    assert_eq!(failed, key);
                    assert!(error.contains("storage offline"));
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        assert!(remote.load("c1").await.unwrap().is_none());
        tokio::fs::remove_file(&path).await.ok();
    }

    struct ContendedStore;

    #[async_trait::async_trait]
    impl ConversationStore for ContendedStore {
        async fn load(&self, _id: &str) -> riko_remote::Result<Option<DocumentSnapshot>> {
            Ok(None)
        }

        async fn store(
            &self,
            conversation_id: &str,
            _data: serde_json::Value,
            expected: Option<Revision>,
        ) -> riko_remote::Result<Revision> {
            Err(RemoteError::RevisionConflict {
                conversation_id: conversation_id.to_string(),
                expected: expected.unwrap_or_default(),
                found: Revision(99),
            })
        }

        async fn watch(&self, _id: &str) -> broadcast::Receiver<DocumentSnapshot> {
            broadcast::channel(1).1
        }
    }

    #[tokio::test]
    async fn test_append_gives_up_after_bounded_contention() {
        let remote = Arc::new(MemoryRemote::new(identity()));
        let session = Session::connect(&*remote).await.unwrap();
        let worker = ChatWorker::new(Arc::new(ContendedStore), remote, session);

        let err = worker.send_text("c1", "hi").await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::AppendContention {
                attempts: MAX_APPEND_ATTEMPTS,
                ..
            }
        ));
    }

    #[test]
    fn test_resubscribe_delay_doubles_and_caps() {
        assert_eq!(resubscribe_delay(0), Duration::from_millis(500));
        assert_eq!(resubscribe_delay(1), Duration::from_millis(1000));
        assert_eq!(resubscribe_delay(3), Duration::from_millis(4000));
        assert_eq!(resubscribe_delay(30), Duration::from_millis(RESUBSCRIBE_CAP_MS));
    }
}
