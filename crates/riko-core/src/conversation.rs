use serde::{Deserialize, Serialize};

use crate::message::{Message, now_millis};

/// The remote conversation document: the full ordered message list
/// plus the writer-stamped update time. The remote store owns it; any
/// local copy is a read-only snapshot from the last notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: i64,
}

impl Conversation {
    /// Append one message to the end and stamp `lastUpdated`.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.last_updated = now_millis();
    }

    pub fn normalize(&mut self) {
        for message in &mut self.messages {
            message.normalize();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
