//! Persistent key-value access, kept behind a trait.
//!
//! The store holds scoped tokens, identity secrets written by the account
//! auth flow, the registry of identities seen by this install, and the saved
//! presence used to restore title timestamps across restarts. Mutations are
//! best-effort: implementations log failures instead of surfacing them.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use vigil_core::{Presence, ScopedToken};

/// Presence snapshot persisted so a restart keeps the title-session origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPresence {
    pub presence: Presence,
    /// Epoch ms the current title session started.
    pub title_since: u64,
    /// Epoch ms this record was written.
    pub created_at: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn load_token(&self, id: &str) -> Option<ScopedToken>;
    async fn save_token(&self, token: &ScopedToken);
    async fn delete_token(&self, id: &str);

    /// Token ids issued by an identity.
    async fn token_ids(&self, identity: &str) -> Vec<String>;
    async fn set_token_ids(&self, identity: &str, ids: &[String]);

    /// The identity secret saved by the account auth flow, if any.
    async fn identity_secret(&self, identity: &str) -> Option<String>;

    /// Union-insert into the registry of identities seen by this install.
    async fn add_known_identity(&self, identity: &str);
    async fn known_identities(&self) -> Vec<String>;

    async fn load_presence(&self, id: &str) -> Option<SavedPresence>;
    async fn save_presence(&self, id: &str, saved: &SavedPresence);
}

/// In-memory store. Used by tests and by embedders that bring their own
/// persistence for everything else.
#[derive(Default)]
pub struct MemStore {
    tokens: DashMap<String, ScopedToken>,
    token_ids: DashMap<String, Vec<String>>,
    secrets: DashMap<String, String>,
    identities: DashMap<String, ()>,
    presence: DashMap<String, SavedPresence>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an identity secret, standing in for the external auth flow.
    pub fn put_identity_secret(&self, identity: &str, secret: &str) {
        self.secrets
            .insert(identity.to_string(), secret.to_string());
    }
}

#[async_trait]
impl Store for MemStore {
    async fn load_token(&self, id: &str) -> Option<ScopedToken> {
        self.tokens.get(id).map(|t| t.clone())
    }

    async fn save_token(&self, token: &ScopedToken) {
        self.tokens.insert(token.token.clone(), token.clone());
    }

    async fn delete_token(&self, id: &str) {
        self.tokens.remove(id);
    }

    async fn token_ids(&self, identity: &str) -> Vec<String> {
        self.token_ids
            .get(identity)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    async fn set_token_ids(&self, identity: &str, ids: &[String]) {
        self.token_ids.insert(identity.to_string(), ids.to_vec());
    }

    async fn identity_secret(&self, identity: &str) -> Option<String> {
        self.secrets.get(identity).map(|s| s.clone())
    }

    async fn add_known_identity(&self, identity: &str) {
        self.identities.insert(identity.to_string(), ());
    }

    async fn known_identities(&self) -> Vec<String> {
        self.identities.iter().map(|e| e.key().clone()).collect()
    }

    async fn load_presence(&self, id: &str) -> Option<SavedPresence> {
        self.presence.get(id).map(|p| p.clone())
    }

    async fn save_presence(&self, id: &str, saved: &SavedPresence) {
        self.presence.insert(id.to_string(), saved.clone());
    }
}
