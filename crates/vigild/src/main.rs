//! vigild — presence synchronization daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use vigil_core::config::VigilConfig;
use vigil_services::{
    auth, AuthGate, LinkManager, MonitorSet, NoMonitorConfig, PresenceOptions, PresencePublisher,
    Store, Upstream,
};

use vigil_api::handlers::EntityCaches;
use vigil_api::ApiState;

mod diff;
mod monitors;
mod peer;
mod pump;
mod store;
mod upstream;

use diff::StateDiffer;
use peer::SocketPeerConnector;
use pump::{Pump, PumpConfig};
use store::JsonStore;
use upstream::HttpUpstream;

/// Cadence of the session idle sweeper.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = VigilConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = VigilConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        VigilConfig::default()
    });

    anyhow::ensure!(
        !config.upstream.base_url.is_empty(),
        "upstream.base_url must be configured (config file: {})",
        VigilConfig::file_path().display()
    );
    tracing::info!(upstream = %config.upstream.base_url, "vigild starting");

    // Shared collaborators
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(config.upstream.base_url.clone()));
    let store: Arc<dyn Store> = Arc::new(JsonStore::open(config.storage.data_path.clone()));
    tracing::info!(path = %config.storage.data_path.display(), "store opened");

    // Auth gate + idle sweeper
    let gate = Arc::new(AuthGate::new(
        upstream.clone(),
        store.clone(),
        config.cache.session_idle(),
    ));
    let expiry_task = tokio::spawn(auth::expiry_loop(gate.clone(), SESSION_SWEEP_INTERVAL));

    // Entity caches — process-wide, shared by HTTP consumers and the pump
    let caches = Arc::new(EntityCaches::default());

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── HTTP API ─────────────────────────────────────────────────────────────

    let state = ApiState {
        gate: gate.clone(),
        upstream: upstream.clone(),
        store: store.clone(),
        differ: Arc::new(StateDiffer),
        caches: caches.clone(),
        require_secret: config.server.require_secret,
        update_interval: config.cache.update_interval(),
        lookup_ttl: config.cache.lookup_ttl(),
        negative_lookup_ttl: config.cache.negative_lookup_ttl(),
        announcement_ttl: config.cache.announcement_ttl(),
    };
    let api_port = config.server.listen_port;
    let api_task = tokio::spawn(async move {
        if let Err(e) = vigil_api::serve(state, api_port).await {
            tracing::error!(error = %e, "API server failed");
        }
    });

    // ── Presence display ─────────────────────────────────────────────────────

    let pump_task = if config.presence.identity.is_empty() {
        tracing::info!("presence display disabled (no presence.identity configured)");
        None
    } else {
        let socket_dir = if config.peer.socket_dir.is_empty() {
            None
        } else {
            Some(config.peer.socket_dir.clone().into())
        };
        let connector = Arc::new(SocketPeerConnector::new(socket_dir));
        let link = LinkManager::new(
            connector,
            config.peer.reconnect_interval(),
            config.peer.preconnect,
            config.peer.target.clone(),
        );

        // Companion monitor, when titles are configured for it.
        let registrations = if config.presence.monitor_titles.is_empty() {
            Vec::new()
        } else {
            match store.identity_secret(&config.presence.identity).await {
                Some(secret) => vec![monitors::registration(
                    upstream.clone(),
                    gate.clone(),
                    secret,
                    config.presence.monitor_titles.clone(),
                )],
                None => Vec::new(),
            }
        };
        let monitor_set = MonitorSet::new(registrations, Arc::new(NoMonitorConfig));

        let tracked_user = if config.presence.user.is_empty() {
            config.presence.identity.clone()
        } else {
            config.presence.user.clone()
        };
        let publisher = Arc::new(PresencePublisher::new(
            link,
            store.clone(),
            monitor_set,
            PresenceOptions {
                tracked_user,
                target: config.peer.target.clone(),
                show_friend_code: config.presence.show_friend_code,
                force_friend_code: if config.presence.force_friend_code.is_empty() {
                    None
                } else {
                    Some(config.presence.force_friend_code.clone())
                },
                show_active_event: config.presence.show_active_event,
                show_inactive: config.presence.show_inactive,
            },
        ));

        let pump = Pump {
            gate: gate.clone(),
            upstream: upstream.clone(),
            caches: caches.clone(),
            store: store.clone(),
            publisher,
            config: PumpConfig {
                identity: config.presence.identity.clone(),
                user: config.presence.user.clone(),
                show_active_event: config.presence.show_active_event,
                interval: config.cache.update_interval(),
            },
        };
        Some(tokio::spawn(pump.run(shutdown_tx.subscribe())))
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = api_task            => tracing::error!("API server exited: {:?}", r),
        r = expiry_task         => tracing::error!("session sweeper exited: {:?}", r),
    }

    if let Some(task) = pump_task {
        // Give the pump a moment to observe the shutdown signal.
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }

    Ok(())
}
