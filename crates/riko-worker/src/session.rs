use std::sync::Arc;

use tokio::sync::RwLock;

use riko_core::{Identity, Sender};
use riko_remote::IdentityProvider;

use crate::error::Result;

/// The authenticated session, passed explicitly to every component
/// that needs the current identity. Read-only for consumers; the only
/// writer is a provider-confirmed rename.
pub struct Session {
    identity: RwLock<Identity>,
}

impl Session {
    /// Fetch the current identity from the provider and pin it.
    pub async fn connect(provider: &dyn IdentityProvider) -> Result<Arc<Self>> {
        let identity = provider.current_identity().await?;
        tracing::info!(user_id = %identity.id, "Session established");
        Ok(Arc::new(Self {
            identity: RwLock::new(identity),
        }))
    }

    pub async fn identity(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// Snapshot embedded into outgoing messages.
    pub async fn sender(&self) -> Sender {
        self.identity.read().await.sender()
    }

    pub(crate) async fn set_display_name(&self, display_name: &str) {
        self.identity.write().await.display_name = display_name.to_string();
    }
}
