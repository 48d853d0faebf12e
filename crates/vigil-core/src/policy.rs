//! Scoped access tokens — delegated, capability-limited credentials.
//!
//! A token binds an identity to a policy. Unset capabilities deny; a request
//! with no token attached at all is a trusted local caller and is fully
//! privileged. The `friends` / `friends_presence` allow-lists narrow which
//! roster entries the token may see.

use serde::{Deserialize, Serialize};

/// A delegated credential, persisted through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedToken {
    pub token: String,
    /// Identity that issued (and is impersonated by) this token.
    pub identity: String,
    pub policy: TokenPolicy,
    /// Epoch seconds.
    pub created_at: u64,
}

/// Capability policy attached to a scoped token.
///
/// Every field is optional so stored policies only carry what the issuer
/// set. `None` denies the capability, except `presence`, which falls back to
/// `profile` when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcements: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_friends: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_friends_presence: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_presence: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webservices: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_event: Option<bool>,
    /// Roster entries this token may see at all. None = all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<String>>,
    /// Roster entries whose presence this token may see. None = falls back
    /// to the `friends` list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friends_presence: Option<Vec<String>>,
}

impl TokenPolicy {
    pub fn allows_announcements(&self) -> bool {
        self.announcements.unwrap_or(false)
    }

    pub fn allows_profile(&self) -> bool {
        self.profile.unwrap_or(false)
    }

    /// Explicit `presence` wins; unset falls back to `profile`.
    pub fn allows_presence(&self) -> bool {
        match self.presence {
            Some(allowed) => allowed,
            None => self.allows_profile(),
        }
    }

    pub fn allows_list_friends(&self) -> bool {
        self.list_friends.unwrap_or(false)
    }

    pub fn allows_list_friends_presence(&self) -> bool {
        self.list_friends_presence.unwrap_or(false)
    }

    pub fn allows_webservices(&self) -> bool {
        self.webservices.unwrap_or(false)
    }

    pub fn allows_active_event(&self) -> bool {
        self.active_event.unwrap_or(false)
    }

    /// May this token see the given roster entry at all?
    pub fn friend_visible(&self, id: &str) -> bool {
        match &self.friends {
            Some(list) => list.iter().any(|f| f == id),
            None => true,
        }
    }

    /// May this token see the given roster entry's presence? The
    /// `friends_presence` list narrows further when set; otherwise the
    /// `friends` list applies.
    pub fn friend_presence_visible(&self, id: &str) -> bool {
        match &self.friends_presence {
            Some(list) => list.iter().any(|f| f == id),
            None => self.friend_visible(id),
        }
    }

    pub fn allows_friend(&self, id: &str) -> bool {
        self.friend.unwrap_or(false) && self.friend_visible(id)
    }

    pub fn allows_friend_presence(&self, id: &str) -> bool {
        self.friend_presence.unwrap_or(false) && self.friend_presence_visible(id)
    }
}
