//! Auth gate — resolves identity secrets to authenticated upstream sessions.
//!
//! The handshake runs at most once per secret per process regardless of how
//! many requests arrive concurrently (same single-flight discipline as the
//! cache). Resolved sessions are held until idle longer than the configured
//! window; a separate expiry task sweeps them out, and the next request for
//! that secret re-runs the handshake.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use vigil_core::UpstreamError;

use crate::store::Store;
use crate::upstream::{SessionHandle, Upstream};

type HandshakeOutcome = Result<Arc<SessionHandle>, Arc<UpstreamError>>;
type InFlight = Shared<BoxFuture<'static, HandshakeOutcome>>;

struct SessionEntry {
    handle: Arc<SessionHandle>,
    last_used: Instant,
}

/// Process-wide session registry, keyed by identity secret.
pub struct AuthGate {
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn Store>,
    sessions: Arc<DashMap<String, SessionEntry>>,
    inflight: Arc<DashMap<String, InFlight>>,
    idle_window: Duration,
}

impl AuthGate {
    pub fn new(upstream: Arc<dyn Upstream>, store: Arc<dyn Store>, idle_window: Duration) -> Self {
        Self {
            upstream,
            store,
            sessions: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
            idle_window,
        }
    }

    /// Resolve a secret to a session, running the upstream handshake if no
    /// cached session exists. Every use refreshes the idle timer.
    pub async fn resolve(&self, secret: &str) -> HandshakeOutcome {
        if let Some(mut entry) = self.sessions.get_mut(secret) {
            entry.last_used = Instant::now();
            return Ok(entry.handle.clone());
        }

        let flight = self.join_or_start(secret);
        flight.await
    }

    fn join_or_start(&self, secret: &str) -> InFlight {
        match self.inflight.entry(secret.to_string()) {
            Slot::Occupied(slot) => slot.get().clone(),
            Slot::Vacant(slot) => {
                let upstream = self.upstream.clone();
                let store = self.store.clone();
                let sessions = self.sessions.clone();
                let inflight = self.inflight.clone();
                let secret = secret.to_string();
                let flight = async move {
                    let outcome = upstream.authenticate(&secret).await;
                    inflight.remove(&secret);
                    match outcome {
                        Ok(handle) => {
                            // Record the identity this install has seen.
                            store.add_known_identity(&handle.identity).await;
                            let handle = Arc::new(handle);
                            sessions.insert(
                                secret,
                                SessionEntry {
                                    handle: handle.clone(),
                                    last_used: Instant::now(),
                                },
                            );
                            tracing::info!(
                                identity = %handle.identity,
                                "upstream session established"
                            );
                            Ok(handle)
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "upstream handshake failed");
                            Err(Arc::new(err))
                        }
                    }
                }
                .boxed()
                .shared();
                slot.insert(flight.clone());
                flight
            }
        }
    }

    /// Remove sessions idle longer than the configured window. Returns how
    /// many were evicted.
    pub fn evict_idle(&self) -> usize {
        let before = self.sessions.len();
        let window = self.idle_window;
        self.sessions
            .retain(|_, entry| entry.last_used.elapsed() < window);
        before - self.sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Periodically sweep idle sessions. Runs forever — cancel by dropping the
/// task handle.
pub async fn expiry_loop(gate: Arc<AuthGate>, sweep_interval: Duration) {
    let mut interval = tokio::time::interval(sweep_interval);
    loop {
        interval.tick().await;
        let evicted = gate.evict_idle();
        if evicted > 0 {
            tracing::debug!(evicted, "idle upstream sessions evicted");
        }
    }
}
