//! Mapping from a presence snapshot to the activity shown on the display peer.

use serde::{Deserialize, Serialize};

use vigil_core::{now_ms, ActiveEvent, Presence, PresenceState};

/// What the display peer is asked to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Peer application identity to attach to.
    pub target: String,
    pub title_id: Option<String>,
    /// Headline line: the title name, or an idle marker.
    pub details: String,
    /// Secondary line: title status, event, or friend code.
    pub state: Option<String>,
    pub image_url: Option<String>,
    /// Epoch ms the current title session started; shown as elapsed time.
    pub started_at: Option<u64>,
}

/// Display options and extras accompanying a presence snapshot.
#[derive(Debug, Clone, Default)]
pub struct ActivityContext {
    /// Peer application identity the activity should attach to.
    pub target: String,
    pub friend_code: Option<String>,
    pub active_event: Option<ActiveEvent>,
    /// Start of the current title session, epoch ms.
    pub title_since: Option<u64>,
}

/// Compute the start-of-session timestamp for a newly observed title: the
/// upstream's last-updated time, clamped to now so clock skew never yields a
/// session that started in the future.
pub fn title_session_start(presence: &Presence) -> u64 {
    (presence.updated_at * 1000).min(now_ms())
}

/// Build the activity for a displayable presence, or `None` when there is
/// nothing to show (offline, or online with no title and idle display off).
pub fn build_activity(presence: &Presence, ctx: &ActivityContext) -> Option<Activity> {
    match (&presence.title, presence.state) {
        (Some(title), state) if state.is_online() => {
            let mut lines = Vec::new();
            if let Some(description) = &title.description {
                if !description.is_empty() {
                    lines.push(description.clone());
                }
            }
            if let Some(event) = &ctx.active_event {
                lines.push(event.name.clone());
            }
            if let Some(code) = &ctx.friend_code {
                lines.push(format!("Code: {code}"));
            }

            Some(Activity {
                target: ctx.target.clone(),
                title_id: Some(title.id.clone()),
                details: title.name.clone(),
                state: lines.first().cloned(),
                image_url: title.image_url.clone(),
                started_at: ctx.title_since,
            })
        }
        (_, PresenceState::Inactive) => Some(Activity {
            target: ctx.target.clone(),
            title_id: None,
            details: "Online".to_string(),
            state: ctx.friend_code.as_ref().map(|code| format!("Code: {code}")),
            image_url: None,
            started_at: None,
        }),
        _ => None,
    }
}
