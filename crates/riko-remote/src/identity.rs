use async_trait::async_trait;

use riko_core::Identity;

use crate::error::Result;

/// The external account system. Identities are created and deleted on
/// the provider side; this client only reads them and renames itself.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_identity(&self) -> Result<Identity>;

    async fn update_display_name(&self, display_name: &str) -> Result<()>;
}
