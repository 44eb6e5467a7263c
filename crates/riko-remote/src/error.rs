use thiserror::Error;

use crate::document::Revision;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Revision conflict on {conversation_id}: wrote against {expected}, store has {found}")]
    RevisionConflict {
        conversation_id: String,
        expected: Revision,
        found: Revision,
    },

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Identity update rejected: {0}")]
    IdentityRejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;
