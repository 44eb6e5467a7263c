mod conversation;
mod identity;
mod message;

pub use conversation::*;
pub use identity::*;
pub use message::*;
