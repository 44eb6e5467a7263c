use serde::{Deserialize, Serialize};

use crate::message::Sender;

/// The authenticated user as the identity provider reports it.
/// `id` is provider-assigned and immutable; `display_name` is the only
/// field this client ever writes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl Identity {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
        }
    }

    /// Snapshot embedded into outgoing messages.
    pub fn sender(&self) -> Sender {
        Sender {
            id: self.id.clone(),
            name: self.display_name.clone(),
            avatar: self.avatar_url.clone(),
        }
    }

    /// Avatar initials: first letter of each word of the display name,
    /// falling back to the first character of the account id.
    pub fn initials(&self) -> String {
        let initials: String = self
            .display_name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .collect();

        if !initials.is_empty() {
            return initials;
        }

        self.id
            .chars()
            .next()
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity::new("user@example.com", name, "https://avatars.test/1")
    }

    #[test]
    fn test_initials_from_full_name() {
        assert_eq!(identity("Ada Lovelace").initials(), "AL");
    }

    #[test]
    fn test_initials_single_word() {
        assert_eq!(identity("Ada").initials(), "A");
    }

    #[test]
    fn test_initials_fall_back_to_id() {
        assert_eq!(identity("").initials(), "U");
        assert_eq!(identity("   ").initials(), "U");
    }

    #[test]
    fn test_sender_snapshot_copies_fields() {
        let sender = identity("Ada Lovelace").sender();
        assert_eq!(sender.id, "user@example.com");
        assert_eq!(sender.name, "Ada Lovelace");
        assert_eq!(sender.avatar, "https://avatars.test/1");
    }
}
