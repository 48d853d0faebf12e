//! Reference presence differ.
//!
//! Decides which semantic events fired between two roster snapshots. Kept
//! out of the core crates on purpose — embedders with their own notification
//! rules replace this implementation.

use std::collections::HashMap;

use vigil_core::Friend;
use vigil_services::{PresenceDiffer, PresenceEvent, PresenceEventKind};

pub struct StateDiffer;

impl StateDiffer {
    fn event(kind: PresenceEventKind, friend: &Friend, prev: &Friend) -> PresenceEvent {
        PresenceEvent {
            kind,
            id: friend.id.clone(),
            presence: friend.presence.clone(),
            prev: Some(prev.presence.clone()),
        }
    }
}

impl PresenceDiffer for StateDiffer {
    fn diff(&self, prev: &[Friend], next: &[Friend]) -> Vec<PresenceEvent> {
        let previous: HashMap<&str, &Friend> =
            prev.iter().map(|f| (f.id.as_str(), f)).collect();
        let mut events = Vec::new();

        for friend in next {
            // New roster entries establish a baseline without events.
            let Some(before) = previous.get(friend.id.as_str()) else {
                continue;
            };

            if friend.presence.updated_at != before.presence.updated_at {
                events.push(Self::event(PresenceEventKind::PresenceUpdated, friend, before));
            }

            let was_online = before.presence.state.is_online();
            let is_online = friend.presence.state.is_online();

            if !was_online && is_online {
                events.push(Self::event(PresenceEventKind::FriendOnline, friend, before));
            } else if was_online && !is_online {
                events.push(Self::event(PresenceEventKind::FriendOffline, friend, before));
            } else if is_online {
                match (&before.presence.title, &friend.presence.title) {
                    (Some(old), Some(new)) if old.id != new.id => {
                        events.push(Self::event(
                            PresenceEventKind::FriendTitleChange,
                            friend,
                            before,
                        ));
                    }
                    (Some(old), Some(new)) if old.description != new.description => {
                        events.push(Self::event(
                            PresenceEventKind::FriendTitleStateChange,
                            friend,
                            before,
                        ));
                    }
                    _ => {}
                }
            }
        }

        events
    }
}
