//! Presence poll loop — feeds the display publisher.
//!
//! Reads through the same process-wide caches as the HTTP layer, so a
//! daemon polling its own presence and a burst of HTTP consumers still
//! produce one upstream fetch per freshness window.

use std::sync::Arc;
use std::time::Duration;

use vigil_core::UpstreamError;
use vigil_services::cache::CacheKey;
use vigil_services::{AuthGate, PresencePublisher, PresenceSnapshot, Store, Upstream};

use vigil_api::handlers::EntityCaches;

/// Poll ticks between monitor-config refreshes.
const MONITOR_REFRESH_TICKS: u64 = 20;

pub struct PumpConfig {
    /// Identity whose roster is polled.
    pub identity: String,
    /// Presence id to display; empty = the identity's own presence.
    pub user: String,
    pub show_active_event: bool,
    pub interval: Duration,
}

pub struct Pump {
    pub gate: Arc<AuthGate>,
    pub upstream: Arc<dyn Upstream>,
    pub caches: Arc<EntityCaches>,
    pub store: Arc<dyn Store>,
    pub publisher: Arc<PresencePublisher>,
    pub config: PumpConfig,
}

impl Pump {
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let Some(secret) = self.store.identity_secret(&self.config.identity).await else {
            tracing::error!(
                identity = %self.config.identity,
                "presence display disabled: no stored secret for identity"
            );
            return;
        };

        tracing::info!(identity = %self.config.identity, "presence poll loop starting");
        let mut restored = false;
        let mut ticks: u64 = 0;
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("presence poll loop stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.update(&secret, &mut restored).await {
                tracing::warn!(error = %err, "presence update failed");
                self.publisher.on_error().await;
            }

            // Periodically refetch monitor configuration so a config change
            // reaches long-running monitors without a title change.
            ticks += 1;
            if ticks % MONITOR_REFRESH_TICKS == 0 {
                self.publisher.refresh_monitor_configs().await;
            }
        }
    }

    async fn update(&self, secret: &str, restored: &mut bool) -> Result<(), Arc<UpstreamError>> {
        let session = self.gate.resolve(secret).await?;
        let tracked = if self.config.user.is_empty() {
            session.presence_id.clone()
        } else {
            self.config.user.clone()
        };

        let snapshot = if tracked == session.presence_id {
            // Own presence comes from the profile.
            let upstream = self.upstream.clone();
            let fetch_session = session.clone();
            let profile = self
                .caches
                .profile
                .get_or_fetch(
                    CacheKey::profile(&session.identity),
                    self.config.interval,
                    async move { upstream.fetch_profile(&fetch_session).await },
                )
                .await?;

            let active_event = if self.config.show_active_event {
                let upstream = self.upstream.clone();
                let fetch_session = session.clone();
                self.caches
                    .app
                    .get_or_fetch(
                        CacheKey::app(&session.identity),
                        self.config.interval,
                        async move {
                            let (webservices, active_event) = futures::try_join!(
                                upstream.fetch_web_services(&fetch_session),
                                upstream.fetch_active_event(&fetch_session),
                            )?;
                            Ok(vigil_services::AppData {
                                webservices,
                                active_event,
                            })
                        },
                    )
                    .await?
                    .value
                    .active_event
            } else {
                None
            };

            PresenceSnapshot {
                presence: Some(profile.value.presence),
                friend_code: profile.value.friend_code,
                active_event,
            }
        } else {
            // A friend's presence comes from the roster.
            let upstream = self.upstream.clone();
            let fetch_session = session.clone();
            let friends = self
                .caches
                .friends
                .get_or_fetch(
                    CacheKey::friends(&session.identity),
                    self.config.interval,
                    async move { upstream.fetch_friends(&fetch_session).await },
                )
                .await?;

            match friends.value.into_iter().find(|f| f.id == tracked) {
                Some(friend) => PresenceSnapshot {
                    presence: Some(friend.presence),
                    friend_code: None,
                    active_event: None,
                },
                None => {
                    // No longer friends with the tracked user: clear.
                    tracing::warn!(user = %tracked, "tracked user missing from roster");
                    PresenceSnapshot::default()
                }
            }
        };

        if !*restored {
            if let Some(presence) = &snapshot.presence {
                self.publisher.restore_title(presence).await;
            }
            *restored = true;
        }

        self.publisher.publish(snapshot).await;
        Ok(())
    }
}
