use riko_core::Message;

/// Everything the UI layer needs to react to, delivered on the
/// worker's event channel.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Full decoded message list from the latest remote notification.
    Snapshot {
        conversation_id: String,
        messages: Vec<Message>,
    },
    SubscriptionLost {
        conversation_id: String,
        reason: String,
    },
    Resubscribed {
        conversation_id: String,
    },
    MessageSent {
        conversation_id: String,
        message_id: String,
    },
    UploadStarted {
        key: String,
    },
    UploadProgress {
        key: String,
        bytes_transferred: u64,
        total_bytes: u64,
    },
    UploadCompleted {
        key: String,
        url: String,
    },
    UploadFailed {
        key: String,
        error: String,
    },
    Error {
        conversation_id: Option<String>,
        error: String,
    },
}
