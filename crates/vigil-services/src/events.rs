//! Presence events pushed to stream consumers.
//!
//! The semantic diffing — deciding which events fired between two roster
//! snapshots — is a collaborator behind [`PresenceDiffer`]; this core only
//! carries the event types and forwards the differ's output.

use serde::Serialize;

use vigil_core::{Friend, Presence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEventKind {
    PresenceUpdated,
    FriendOnline,
    FriendOffline,
    FriendTitleChange,
    FriendTitleStateChange,
}

impl PresenceEventKind {
    /// Wire name used as the SSE event name.
    pub fn name(self) -> &'static str {
        match self {
            PresenceEventKind::PresenceUpdated => "presence_updated",
            PresenceEventKind::FriendOnline => "friend_online",
            PresenceEventKind::FriendOffline => "friend_offline",
            PresenceEventKind::FriendTitleChange => "friend_title_change",
            PresenceEventKind::FriendTitleStateChange => "friend_title_statechange",
        }
    }
}

/// One semantic presence event.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceEvent {
    #[serde(skip)]
    pub kind: PresenceEventKind,
    pub id: String,
    pub presence: Presence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<Presence>,
}

pub trait PresenceDiffer: Send + Sync {
    /// Events that fired between two roster snapshots. The first snapshot of
    /// a stream has an empty `prev`; implementations treat that as baseline.
    fn diff(&self, prev: &[Friend], next: &[Friend]) -> Vec<PresenceEvent>;
}
