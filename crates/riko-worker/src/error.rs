use thiserror::Error;

use riko_remote::RemoteError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Malformed conversation document {conversation_id}: {source}")]
    MalformedDocument {
        conversation_id: String,
        source: serde_json::Error,
    },

    #[error("Append to {conversation_id} gave up after {attempts} contended attempts")]
    AppendContention {
        conversation_id: String,
        attempts: u32,
    },

    #[error("Attachment read failed: {0}")]
    AttachmentRead(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
