use std::sync::Arc;

use riko_remote::IdentityProvider;

use crate::error::Result;
use crate::session::Session;

const DEFAULT_ABOUT: &str = "Available";

/// Form state for the profile screen: a name field persisted through
/// the identity provider and an about field that never leaves memory.
/// Takes its session and provider explicitly; nothing here reads
/// global state.
pub struct ProfileEditor {
    session: Arc<Session>,
    provider: Arc<dyn IdentityProvider>,
    name_input: String,
    about_input: String,
    display_name: String,
    about: String,
}

impl ProfileEditor {
    pub async fn new(session: Arc<Session>, provider: Arc<dyn IdentityProvider>) -> Self {
        let identity = session.identity().await;
        Self {
            session,
            provider,
            name_input: identity.display_name.clone(),
            about_input: String::new(),
            display_name: identity.display_name,
            about: DEFAULT_ABOUT.to_string(),
        }
    }

    /// The name currently shown on the profile screen.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn about(&self) -> &str {
        &self.about
    }

    pub fn set_name_input(&mut self, value: impl Into<String>) {
        self.name_input = value.into();
    }

    pub fn set_about_input(&mut self, value: impl Into<String>) {
        self.about_input = value.into();
    }

    /// Persist the staged name through the provider. The displayed
    /// name and the session only change once the provider confirms.
    pub async fn save_name(&mut self) -> Result<()> {
        self.provider.update_display_name(&self.name_input).await?;

        self.session.set_display_name(&self.name_input).await;
        self.display_name = self.name_input.clone();
        tracing::info!(display_name = %self.display_name, "Display name updated");
        Ok(())
    }

    /// The about text is session-local; it is never written anywhere.
    pub fn save_about(&mut self) {
        self.about = self.about_input.clone();
    }
}
