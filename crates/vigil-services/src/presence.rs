//! Presence publisher — turns presence snapshots into display-peer activity.
//!
//! Owns the title-session state (which title is showing and since when), the
//! monitor set, and the consecutive-failure counters that protect the peer
//! from displaying stale activity indefinitely.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use vigil_core::{now_ms, ActiveEvent, Presence, PresenceState};

use crate::activity::{build_activity, title_session_start, ActivityContext};
use crate::link::LinkManager;
use crate::monitor::MonitorSet;
use crate::store::{SavedPresence, Store};

/// Failures tolerated before the link is torn down defensively.
const TEARDOWN_AFTER_FAILURES: u32 = 2;
/// Failures tolerated before the tracked title session is reset.
const TITLE_RESET_AFTER_FAILURES: u32 = 10;

/// Display options, fixed at construction from config.
#[derive(Debug, Clone)]
pub struct PresenceOptions {
    /// Presence id being displayed; used as the persistence key.
    pub tracked_user: String,
    /// Peer application identity activities attach to.
    pub target: String,
    pub show_friend_code: bool,
    pub force_friend_code: Option<String>,
    pub show_active_event: bool,
    /// Show the console-online idle state instead of clearing.
    pub show_inactive: bool,
}

/// Everything the publisher needs to compute one update.
#[derive(Debug, Clone, Default)]
pub struct PresenceSnapshot {
    pub presence: Option<Presence>,
    pub friend_code: Option<String>,
    pub active_event: Option<ActiveEvent>,
}

/// The title currently displayed and when its session started (epoch ms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleSession {
    pub id: String,
    pub since: u64,
}

struct PublishState {
    title: Option<TitleSession>,
    last: Option<PresenceSnapshot>,
    failures: u32,
    monitors: MonitorSet,
}

pub struct PresencePublisher {
    link: LinkManager,
    store: Arc<dyn Store>,
    options: PresenceOptions,
    state: Mutex<PublishState>,
    /// presence.updated_at already persisted, per tracked id.
    saved: DashMap<String, u64>,
}

impl PresencePublisher {
    pub fn new(
        link: LinkManager,
        store: Arc<dyn Store>,
        monitors: MonitorSet,
        options: PresenceOptions,
    ) -> Self {
        Self {
            link,
            store,
            options,
            state: Mutex::new(PublishState {
                title: None,
                last: None,
                failures: 0,
                monitors,
            }),
            saved: DashMap::new(),
        }
    }

    /// Restore the title session persisted by a previous run, if it still
    /// matches the live presence. Keeps the displayed play-time origin
    /// stable across restarts.
    pub async fn restore_title(&self, presence: &Presence) {
        let Some(saved) = self.store.load_presence(&self.options.tracked_user).await else {
            return;
        };
        if saved.presence.updated_at != presence.updated_at {
            return;
        }
        let (Some(live_title), Some(saved_title)) = (presence.title_id(), saved.presence.title_id())
        else {
            return;
        };
        if live_title != saved_title {
            return;
        }

        let mut st = self.state.lock().await;
        st.title = Some(TitleSession {
            id: live_title.to_string(),
            since: saved.title_since,
        });
        tracing::debug!(title = live_title, "restored title session");
    }

    /// Publish a presence snapshot to the display peer and reconcile
    /// monitors. The link manager absorbs connection failures; send failures
    /// on a live link count toward the defensive teardown.
    pub async fn publish(&self, snapshot: PresenceSnapshot) {
        let mut st = self.state.lock().await;
        st.last = Some(snapshot.clone());

        let displayable = snapshot.presence.as_ref().filter(|p| {
            (p.state.is_online() && p.title.is_some())
                || (self.options.show_inactive && p.state == PresenceState::Inactive)
        });

        let Some(presence) = displayable else {
            st.title = None;
            st.monitors.clear();
            drop(st);
            let result = self.link.set_activity(None).await;
            self.record_outcome(result.is_ok()).await;
            return;
        };

        let prev_title_id = st.title.as_ref().map(|t| t.id.clone());

        // Track the title session. The start is the upstream's last-updated
        // time, kept across refreshes of the same title.
        match &presence.title {
            Some(title) => {
                if prev_title_id.as_deref() != Some(title.id.as_str()) {
                    st.title = Some(TitleSession {
                        id: title.id.clone(),
                        since: title_session_start(presence),
                    });
                }
            }
            None => st.title = None,
        }
        let title_changed = prev_title_id.as_deref() != st.title.as_ref().map(|t| t.id.as_str());

        let friend_code = if self.options.show_friend_code {
            self.options
                .force_friend_code
                .clone()
                .or_else(|| snapshot.friend_code.clone())
        } else {
            None
        };
        let ctx = ActivityContext {
            target: self.options.target.clone(),
            friend_code,
            active_event: if self.options.show_active_event {
                snapshot.active_event.clone()
            } else {
                None
            },
            title_since: st.title.as_ref().map(|t| t.since),
        };
        let activity = build_activity(presence, &ctx);

        let requested = st.monitors.kinds_for(presence.title.as_ref());
        st.monitors
            .reconcile(&requested, presence.title.as_ref(), title_changed)
            .await;

        let title_since = st.title.as_ref().map(|t| t.since);
        drop(st);

        let result = self.link.set_activity(activity).await;
        let ok = result.is_ok();
        if let Err(err) = result {
            tracing::warn!(error = %err, "activity update failed");
        }
        self.record_outcome(ok).await;

        if ok {
            self.save_title(presence, title_since).await;
        }
    }

    /// Re-publish the last snapshot, e.g. after a monitor asked for a
    /// refresh or options-relevant state changed.
    pub async fn refresh(&self) {
        let last = self.state.lock().await.last.clone();
        if let Some(snapshot) = last {
            self.publish(snapshot).await;
        }
    }

    /// Record an update failure that happened outside a publish (e.g. the
    /// poll loop failed to fetch presence at all).
    pub async fn on_error(&self) {
        self.record_outcome(false).await;
    }

    /// Ask every live monitor to refetch its configuration.
    pub async fn refresh_monitor_configs(&self) {
        let mut st = self.state.lock().await;
        st.monitors.refresh_configs().await;
    }

    pub async fn current_title(&self) -> Option<TitleSession> {
        self.state.lock().await.title.clone()
    }

    async fn record_outcome(&self, ok: bool) {
        let mut st = self.state.lock().await;
        if ok {
            st.failures = 0;
            return;
        }
        st.failures += 1;
        let failures = st.failures;
        if failures > TITLE_RESET_AFTER_FAILURES {
            // Stale for so long the next success is a fresh title start.
            st.title = None;
        }
        drop(st);
        if failures > TEARDOWN_AFTER_FAILURES {
            // Keep a dead link from displaying stale activity indefinitely.
            self.link.teardown().await;
        }
    }

    /// Persist the presence backing the current title session, deduplicated
    /// by the upstream's updated_at.
    async fn save_title(&self, presence: &Presence, title_since: Option<u64>) {
        let key = &self.options.tracked_user;
        if self
            .saved
            .get(key)
            .is_some_and(|at| *at == presence.updated_at)
        {
            return;
        }
        let record = SavedPresence {
            presence: presence.clone(),
            title_since: title_since.unwrap_or_else(now_ms),
            created_at: now_ms(),
        };
        self.store.save_presence(key, &record).await;
        self.saved.insert(key.clone(), presence.updated_at);
    }
}
