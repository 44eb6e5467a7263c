use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity snapshot carried inside a message, frozen at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

/// One chat message as stored in the conversation document. Immutable
/// once appended; the only mutation path is a whole-list rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    pub sender: Sender,
    #[serde(default)]
    pub sent: bool,
    #[serde(default)]
    pub received: bool,
}

impl Message {
    /// Create a text message with a fresh uuid id, stamped now.
    pub fn text(body: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: body.into(),
            image: None,
            created_at: now_millis(),
            sender,
            sent: false,
            received: false,
        }
    }

    /// Create an image message. The body stays empty, matching what
    /// the chat UI renders for picture-only messages.
    pub fn image(url: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: String::new(),
            image: Some(url.into()),
            created_at: now_millis(),
            sender,
            sent: false,
            received: false,
        }
    }

    /// Flags applied to an outgoing message at append time.
    pub fn outgoing(mut self) -> Self {
        self.sent = true;
        self.received = false;
        self
    }

    /// Remote documents are not guaranteed to be well-formed: the
    /// image field may be an empty string instead of absent, and
    /// timestamps may predate the epoch.
    pub fn normalize(&mut self) {
        if self.image.as_deref() == Some("") {
            self.image = None;
        }
        if self.created_at < 0 {
            self.created_at = 0;
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
