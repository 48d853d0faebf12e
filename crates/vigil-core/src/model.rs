//! Presence data model — the entities polled from the upstream account
//! service and served to HTTP consumers.

use serde::{Deserialize, Serialize};

/// Epoch milliseconds. Timestamps in the model are u64 epoch values; the
/// upstream reports seconds, responses carry milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Connection state of an account's console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    #[default]
    Offline,
    /// Console online but nothing running.
    Inactive,
    Online,
    Playing,
}

impl PresenceState {
    /// Online enough to have a displayable title.
    pub fn is_online(self) -> bool {
        matches!(self, PresenceState::Online | PresenceState::Playing)
    }
}

/// The title an account is currently running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    /// Title-reported status line, e.g. a game mode. Changes within one
    /// title are state changes, not title changes.
    pub description: Option<String>,
    /// Minutes of recorded play time.
    pub total_play_time: u64,
    pub first_played_at: u64,
}

/// A point-in-time presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub state: PresenceState,
    /// When the upstream last observed a change, epoch seconds.
    pub updated_at: u64,
    /// When the account last went offline, epoch seconds. 0 = unknown.
    pub logout_at: u64,
    pub title: Option<Title>,
}

impl Presence {
    pub fn offline() -> Self {
        Self {
            state: PresenceState::Offline,
            updated_at: 0,
            logout_at: 0,
            title: None,
        }
    }

    pub fn title_id(&self) -> Option<&str> {
        self.title.as_ref().map(|t| t.id.as_str())
    }
}

/// The authenticated account's own profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Presence id — the id friends see.
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub friend_code: Option<String>,
    pub presence: Presence,
}

/// One entry of the account's friend roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub is_favorite: bool,
    pub presence: Presence,
}

/// A companion web service offered by the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebService {
    pub id: u64,
    pub name: String,
    pub uri: String,
    pub image_url: Option<String>,
}

/// Short-lived credential for a companion web service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebServiceToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// An in-game event the account can currently join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub share_url: Option<String>,
}

/// Service-wide announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: u64,
    pub title: String,
    pub text: String,
    pub date: u64,
}

/// A user resolved by id or friend-code lookup; not necessarily a friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
}

/// The account's own friend code and its share URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendCodeInfo {
    pub code: String,
    pub url: String,
}
