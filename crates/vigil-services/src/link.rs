//! Peer link manager — owns the single connection to the local
//! presence-display peer.
//!
//! The manager is a state machine over {disconnected, connecting, connected}.
//! Connect loops retry forever at a fixed interval. Every spawned loop and
//! close-watcher captures the generation counter current when it started and
//! re-validates it under the state lock before touching anything; bumping the
//! generation is the only cancellation mechanism. The most recently set
//! activity is replayed on every successful attach.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::activity::Activity;

/// A candidate display peer, as declared in its attach handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Application identity the peer declares.
    pub identity: String,
    pub name: Option<String>,
}

/// Caller-supplied predicate narrowing which candidate peers are acceptable.
pub type PeerFilter = Arc<dyn Fn(&PeerInfo) -> bool + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No acceptable peer was reachable. Absorbed by the retry loop.
    #[error("no presence peer available: {0}")]
    Unavailable(String),
    /// The live link failed mid-send.
    #[error("peer transport failed: {0}")]
    Transport(String),
}

/// One attached display-peer connection.
#[async_trait]
pub trait PeerLink: Send + Sync {
    fn peer(&self) -> &PeerInfo;

    /// Display an activity; `None` clears to explicit offline.
    async fn send(&self, activity: Option<&Activity>) -> Result<(), LinkError>;

    /// Resolves when the transport drops.
    async fn closed(&self);

    /// Tear the transport down. Idempotent.
    async fn shutdown(&self);
}

/// Locates and attaches to a display peer for a target application identity.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        target: &str,
        filter: Option<&PeerFilter>,
    ) -> Result<Arc<dyn PeerLink>, LinkError>;
}

struct LiveLink {
    link: Arc<dyn PeerLink>,
    target: String,
}

#[derive(Default)]
struct LinkState {
    generation: u64,
    live: Option<LiveLink>,
    last_activity: Option<Activity>,
}

/// Snapshot of the manager's state, for status reporting.
#[derive(Debug, Clone)]
pub struct LinkStatus {
    pub connected: bool,
    pub peer: Option<PeerInfo>,
    pub generation: u64,
}

/// Shared handle to the one peer link. Cloning shares state, like the other
/// process-wide registries.
#[derive(Clone)]
pub struct LinkManager {
    connector: Arc<dyn PeerConnector>,
    filter: Option<PeerFilter>,
    reconnect_interval: Duration,
    /// Keep the link warm on empty activity instead of tearing down.
    preconnect: bool,
    /// Target identity used when warming the link with nothing to display.
    default_target: String,
    state: Arc<Mutex<LinkState>>,
}

impl LinkManager {
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        reconnect_interval: Duration,
        preconnect: bool,
        default_target: String,
    ) -> Self {
        Self {
            connector,
            filter: None,
            reconnect_interval,
            preconnect,
            default_target,
            state: Arc::new(Mutex::new(LinkState::default())),
        }
    }

    /// Restrict acceptable peers with a predicate over their declared
    /// identity.
    pub fn with_filter(mut self, filter: PeerFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set (or clear) the displayed activity. Establishes the link on first
    /// use, switches peers when the target identity changes, and — unless
    /// pre-connect is enabled — disconnects on clear. Errors are only
    /// reported for sends on a live link; connection establishment is
    /// retried in the background.
    pub async fn set_activity(&self, activity: Option<Activity>) -> Result<(), LinkError> {
        let mut st = self.state.lock().await;
        match activity {
            Some(activity) => {
                st.last_activity = Some(activity.clone());

                // Target change: tear the old link down before dialing anew.
                if st
                    .live
                    .as_ref()
                    .is_some_and(|live| live.target != activity.target)
                {
                    st.generation += 1;
                    if let Some(live) = st.live.take() {
                        tracing::info!(
                            old = %live.target, new = %activity.target,
                            "display target changed, dropping peer link"
                        );
                        live.link.shutdown().await;
                    }
                }

                let live_link = st.live.as_ref().map(|live| live.link.clone());
                match live_link {
                    Some(link) => {
                        // Lock held across the send: sends on one link never race.
                        link.send(Some(&activity)).await
                    }
                    None => {
                        st.generation += 1;
                        let generation = st.generation;
                        let target = activity.target.clone();
                        drop(st);
                        self.spawn_connect(generation, target);
                        Ok(())
                    }
                }
            }
            None => {
                st.last_activity = None;
                if self.preconnect {
                    let live_link = st.live.as_ref().map(|live| live.link.clone());
                    match live_link {
                        // Hold-open: explicit offline keeps the link warm.
                        Some(link) => link.send(None).await,
                        None => {
                            st.generation += 1;
                            let generation = st.generation;
                            drop(st);
                            self.spawn_connect(generation, self.default_target.clone());
                            Ok(())
                        }
                    }
                } else {
                    st.generation += 1;
                    if let Some(live) = st.live.take() {
                        live.link.shutdown().await;
                    }
                    Ok(())
                }
            }
        }
    }

    /// Drop the link defensively (e.g. after repeated publish failures).
    /// Invalidates in-flight connect loops; the next activity reconnects.
    pub async fn teardown(&self) {
        let mut st = self.state.lock().await;
        st.generation += 1;
        if let Some(live) = st.live.take() {
            tracing::warn!(target = %live.target, "tearing down peer link");
            live.link.shutdown().await;
        }
    }

    pub async fn status(&self) -> LinkStatus {
        let st = self.state.lock().await;
        LinkStatus {
            connected: st.live.is_some(),
            peer: st.live.as_ref().map(|live| live.link.peer().clone()),
            generation: st.generation,
        }
    }

    fn spawn_connect(&self, generation: u64, target: String) {
        tokio::spawn(run_connect(self.clone(), generation, target));
    }
}

/// Attempt to attach forever, one try per reconnect interval. Gives up only
/// when the captured generation goes stale; a success arriving after that is
/// discarded, not installed.
async fn run_connect(mgr: LinkManager, generation: u64, target: String) {
    loop {
        if mgr.state.lock().await.generation != generation {
            return;
        }

        match mgr.connector.connect(&target, mgr.filter.as_ref()).await {
            Ok(link) => {
                let mut st = mgr.state.lock().await;
                if st.generation != generation {
                    // A newer attempt sequence superseded this one.
                    drop(st);
                    link.shutdown().await;
                    return;
                }
                tracing::info!(target = %target, peer = %link.peer().identity, "peer link attached");
                st.live = Some(LiveLink {
                    link: link.clone(),
                    target: target.clone(),
                });
                // Replay the most recently set activity on the fresh link.
                let replay = st.last_activity.clone();
                if let Err(err) = link.send(replay.as_ref()).await {
                    tracing::warn!(error = %err, "replay on fresh peer link failed");
                }
                drop(st);
                tokio::spawn(watch_close(mgr, generation, link, target));
                return;
            }
            Err(err) => {
                tracing::debug!(error = %err, target = %target, "peer attach failed, retrying");
                tokio::time::sleep(mgr.reconnect_interval).await;
            }
        }
    }
}

/// Wait for the transport to drop, then reconnect under the same generation.
/// A stale generation, or a different live link, means a newer request
/// already superseded this connection: do nothing.
async fn watch_close(mgr: LinkManager, generation: u64, link: Arc<dyn PeerLink>, target: String) {
    link.closed().await;

    let mut st = mgr.state.lock().await;
    if st.generation != generation {
        return;
    }
    match &st.live {
        Some(live) if Arc::ptr_eq(&live.link, &link) => {}
        _ => return,
    }
    st.live = None;
    drop(st);

    tracing::info!(target = %target, "peer link dropped, reconnecting");
    mgr.spawn_connect(generation, target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn activity(target: &str, details: &str) -> Activity {
        Activity {
            target: target.to_string(),
            title_id: None,
            details: details.to_string(),
            state: None,
            image_url: None,
            started_at: None,
        }
    }

    struct MockLink {
        info: PeerInfo,
        sends: Arc<std::sync::Mutex<Vec<Option<Activity>>>>,
        closed: Notify,
        is_closed: AtomicBool,
        was_shutdown: Arc<AtomicBool>,
    }

    impl MockLink {
        fn new(identity: &str) -> Arc<Self> {
            Arc::new(Self {
                info: PeerInfo {
                    identity: identity.to_string(),
                    name: None,
                },
                sends: Arc::new(std::sync::Mutex::new(Vec::new())),
                closed: Notify::new(),
                is_closed: AtomicBool::new(false),
                was_shutdown: Arc::new(AtomicBool::new(false)),
            })
        }

        fn drop_transport(&self) {
            self.is_closed.store(true, Ordering::SeqCst);
            self.closed.notify_waiters();
        }

        fn sent(&self) -> Vec<Option<Activity>> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PeerLink for MockLink {
        fn peer(&self) -> &PeerInfo {
            &self.info
        }

        async fn send(&self, activity: Option<&Activity>) -> Result<(), LinkError> {
            self.sends.lock().unwrap().push(activity.cloned());
            Ok(())
        }

        async fn closed(&self) {
            if self.is_closed.load(Ordering::SeqCst) {
                return;
            }
            self.closed.notified().await;
        }

        async fn shutdown(&self) {
            self.was_shutdown.store(true, Ordering::SeqCst);
            self.drop_transport();
        }
    }

    /// Scriptable connector: fails `fail_first` times, then hands out links.
    struct MockConnector {
        fail_first: AtomicUsize,
        attempts: AtomicUsize,
        links: std::sync::Mutex<Vec<Arc<MockLink>>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockConnector {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_first: AtomicUsize::new(fail_first),
                attempts: AtomicUsize::new(0),
                links: std::sync::Mutex::new(Vec::new()),
                gate: None,
            })
        }

        /// Connector that blocks every attempt until the gate is notified.
        fn gated(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                fail_first: AtomicUsize::new(0),
                attempts: AtomicUsize::new(0),
                links: std::sync::Mutex::new(Vec::new()),
                gate: Some(gate),
            })
        }

        fn link(&self, i: usize) -> Arc<MockLink> {
            self.links.lock().unwrap()[i].clone()
        }

        fn link_count(&self) -> usize {
            self.links.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PeerConnector for MockConnector {
        async fn connect(
            &self,
            target: &str,
            filter: Option<&PeerFilter>,
        ) -> Result<Arc<dyn PeerLink>, LinkError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LinkError::Unavailable("nobody home".to_string()));
            }
            let link = MockLink::new(target);
            if let Some(filter) = filter {
                if !filter(link.peer()) {
                    return Err(LinkError::Unavailable("filtered".to_string()));
                }
            }
            self.links.lock().unwrap().push(link.clone());
            Ok(link)
        }
    }

    fn manager(connector: Arc<MockConnector>) -> LinkManager {
        LinkManager::new(
            connector,
            Duration::from_millis(10),
            false,
            "default".to_string(),
        )
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn attaches_and_replays_activity() {
        let connector = MockConnector::new(0);
        let mgr = manager(connector.clone());

        mgr.set_activity(Some(activity("app", "playing"))).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;

        let link = connector.link(0);
        wait_for(|| !link.sent().is_empty()).await;
        assert_eq!(link.sent()[0].as_ref().unwrap().details, "playing");
        assert!(mgr.status().await.connected);
    }

    #[tokio::test]
    async fn retries_until_peer_appears() {
        let connector = MockConnector::new(3);
        let mgr = manager(connector.clone());

        mgr.set_activity(Some(activity("app", "x"))).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;
        assert!(connector.attempts.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn reconnect_replays_last_activity_exactly_once() {
        let connector = MockConnector::new(0);
        let mgr = manager(connector.clone());

        mgr.set_activity(Some(activity("app", "x"))).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;
        let first = connector.link(0);
        wait_for(|| first.sent().len() == 1).await;

        // Transport drops; the watcher reconnects under the same generation.
        first.drop_transport();
        wait_for(|| connector.link_count() == 2).await;
        let second = connector.link(1);
        wait_for(|| !second.sent().is_empty()).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(second.sent().len(), 1);
        assert_eq!(second.sent()[0].as_ref().unwrap().details, "x");
    }

    #[tokio::test]
    async fn stale_generation_discards_late_attach() {
        let gate = Arc::new(Notify::new());
        let connector = MockConnector::gated(gate.clone());
        let mgr = manager(connector.clone());

        // First attempt sequence blocks inside the connector.
        mgr.set_activity(Some(activity("app-a", "a"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A newer request supersedes it.
        mgr.set_activity(Some(activity("app-b", "b"))).await.unwrap();

        // Let both pending connects finish: the first result must be
        // discarded, the second installed.
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_waiters();
        wait_for(|| connector.link_count() >= 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = mgr.status().await;
        assert!(status.connected);
        assert_eq!(status.peer.unwrap().identity, "app-b");

        // Any link created for app-a was shut down, not installed.
        for i in 0..connector.link_count() {
            let link = connector.link(i);
            if link.peer().identity == "app-a" {
                assert!(link.was_shutdown.load(Ordering::SeqCst));
            }
        }
    }

    #[tokio::test]
    async fn clear_disconnects_without_preconnect() {
        let connector = MockConnector::new(0);
        let mgr = manager(connector.clone());

        mgr.set_activity(Some(activity("app", "x"))).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;
        let link = connector.link(0);

        mgr.set_activity(None).await.unwrap();
        assert!(link.was_shutdown.load(Ordering::SeqCst));
        assert!(!mgr.status().await.connected);
    }

    #[tokio::test]
    async fn clear_with_preconnect_sends_offline_and_keeps_link() {
        let connector = MockConnector::new(0);
        let mgr = LinkManager::new(
            connector.clone(),
            Duration::from_millis(10),
            true,
            "default".to_string(),
        );

        mgr.set_activity(Some(activity("app", "x"))).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;
        let link = connector.link(0);
        wait_for(|| link.sent().len() == 1).await;

        mgr.set_activity(None).await.unwrap();
        assert_eq!(link.sent().len(), 2);
        assert!(link.sent()[1].is_none());
        assert!(mgr.status().await.connected);
    }

    #[tokio::test]
    async fn filter_keeps_retrying_past_rejected_peers() {
        let connector = MockConnector::new(0);
        let rejected = Arc::new(AtomicUsize::new(0));
        let counting = rejected.clone();
        let filter: PeerFilter = Arc::new(move |info: &PeerInfo| {
            counting.fetch_add(1, Ordering::SeqCst);
            info.identity != "app"
        });
        let mgr = LinkManager::new(
            connector.clone(),
            Duration::from_millis(10),
            false,
            "default".to_string(),
        )
        .with_filter(filter);

        mgr.set_activity(Some(activity("app", "x"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Every candidate is rejected, so the manager keeps retrying and
        // never installs a link.
        assert!(rejected.load(Ordering::SeqCst) >= 2);
        assert!(!mgr.status().await.connected);
        mgr.teardown().await;
    }

    #[tokio::test]
    async fn preconnect_warms_link_with_offline_activity() {
        let connector = MockConnector::new(0);
        let mgr = LinkManager::new(
            connector.clone(),
            Duration::from_millis(10),
            true,
            "default".to_string(),
        );

        // Nothing to display, but pre-connect dials the default target and
        // sends explicit offline.
        mgr.set_activity(None).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;
        let link = connector.link(0);
        wait_for(|| !link.sent().is_empty()).await;
        assert_eq!(link.peer().identity, "default");
        assert!(link.sent()[0].is_none());
    }

    #[tokio::test]
    async fn target_change_tears_down_old_link_first() {
        let connector = MockConnector::new(0);
        let mgr = manager(connector.clone());

        mgr.set_activity(Some(activity("app-a", "a"))).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;
        let first = connector.link(0);

        mgr.set_activity(Some(activity("app-b", "b"))).await.unwrap();
        assert!(first.was_shutdown.load(Ordering::SeqCst));
        wait_for(|| connector.link_count() == 2).await;
        wait_for(|| !connector.link(1).sent().is_empty()).await;
        assert_eq!(connector.link(1).peer().identity, "app-b");
    }

    #[tokio::test]
    async fn teardown_invalidates_watchers() {
        let connector = MockConnector::new(0);
        let mgr = manager(connector.clone());

        mgr.set_activity(Some(activity("app", "x"))).await.unwrap();
        wait_for(|| connector.link_count() == 1).await;
        let link = connector.link(0);

        mgr.teardown().await;
        assert!(link.was_shutdown.load(Ordering::SeqCst));

        // The close-watcher sees a stale generation and must not reconnect.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.link_count(), 1);
        assert!(!mgr.status().await.connected);
    }
}
