//! Player identity and the player lookup/create collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Unique identifier for players.
pub type PlayerId = Uuid;

/// Who is playing in this client process.
///
/// Starts with a randomized display name and no id; filled in from the
/// player service before a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: Option<PlayerId>,
    pub display_name: String,
}

impl PlayerIdentity {
    /// A fresh identity with no id and a name like `player-3f9a0c1e`.
    pub fn random() -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self {
            id: None,
            display_name: format!("player-{suffix}"),
        }
    }

    /// Whether the server knows this player yet.
    pub fn is_registered(&self) -> bool {
        self.id.is_some()
    }
}

impl Default for PlayerIdentity {
    fn default() -> Self {
        Self::random()
    }
}

/// Request-reply player service. Runs over its own calls, never over the
/// session connection.
#[async_trait]
pub trait PlayerDirectory: Send + Sync + 'static {
    /// Register a new player under `display_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Collaborator`] if the service rejects the call.
    async fn create_player(&self, display_name: &str) -> Result<PlayerIdentity, SessionError>;

    /// Fetch the player owned by the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Collaborator`] if there is none or the call fails.
    async fn get_own_player(&self) -> Result<PlayerIdentity, SessionError>;
}
