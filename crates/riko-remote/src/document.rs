use std::fmt;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

/// Per-document version assigned by the store on every successful
/// write. Strictly increasing; revision 0 never exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// One observed state of a conversation document, as delivered by
/// `load` and by the change feed.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub conversation_id: String,
    pub revision: Revision,
    pub data: serde_json::Value,
}

/// The remote document database: one JSON document per conversation,
/// read whole, written whole, watched for changes.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Current document state, or `None` if it was never written.
    async fn load(&self, conversation_id: &str) -> Result<Option<DocumentSnapshot>>;

    /// Replace the whole document.
    ///
    /// With `expected: Some(rev)` the write only lands while the stored
    /// revision still matches, failing with `RevisionConflict` otherwise.
    /// With `expected: None` it overwrites unconditionally, like the
    /// vendor's plain `set`: two concurrent writers silently race.
    async fn store(
        &self,
        conversation_id: &str,
        data: serde_json::Value,
        expected: Option<Revision>,
    ) -> Result<Revision>;

    /// Subscribe to every subsequent write of the document. A lagging
    /// receiver loses intermediate snapshots, never the newest one:
    /// callers are expected to `load` again after a lag.
    async fn watch(&self, conversation_id: &str) -> broadcast::Receiver<DocumentSnapshot>;
}
