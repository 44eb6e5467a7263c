mod blob;
mod document;
mod error;
mod identity;
mod memory;

pub use blob::{BlobStore, TransferProgress};
pub use document::{ConversationStore, DocumentSnapshot, Revision};
pub use error::{RemoteError, Result};
pub use identity::IdentityProvider;
pub use memory::MemoryRemote;
