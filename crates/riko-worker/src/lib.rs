mod error;
mod events;
mod profile;
mod session;
mod worker;

pub use error::WorkerError;
pub use events::ChatEvent;
pub use profile::ProfileEditor;
pub use session::Session;
pub use worker::{ChatWorker, ConversationGuard};

pub use riko_core::{Conversation, Identity, Message, Sender};
pub use riko_remote::{BlobStore, ConversationStore, IdentityProvider, MemoryRemote};
