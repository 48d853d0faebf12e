//! Request-coalescing TTL cache.
//!
//! One cache entry and at most one in-flight fetch per key. Concurrent
//! callers for a missing or stale key all await the same shared fetch and
//! observe the same outcome; failures are never cached. Entries are replaced
//! wholesale on refresh, never mutated in place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use vigil_core::{now_ms, UpstreamError};

/// Composite cache key: entity kind, owning identity, optional sub-key.
///
/// Keys are opaque strings built by the constructors below; the kind prefix
/// rules out cross-kind collisions, and sub-keys are validated before a key
/// can exist at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

/// Malformed caller-supplied sub-key, rejected before any cache or upstream
/// interaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid friend code, expected ####-####-####")]
    BadFriendCode,
    #[error("invalid user id, expected 16 digits")]
    BadUserId,
}

impl CacheKey {
    pub fn profile(identity: &str) -> Self {
        Self(format!("profile:{identity}"))
    }

    pub fn friends(identity: &str) -> Self {
        Self(format!("friends:{identity}"))
    }

    /// Web services + active event, fetched together.
    pub fn app(identity: &str) -> Self {
        Self(format!("app:{identity}"))
    }

    pub fn code_url(identity: &str) -> Self {
        Self(format!("code_url:{identity}"))
    }

    /// Friend-code lookup. The code is validated here so a malformed code
    /// never reaches the cache or the upstream.
    pub fn lookup(identity: &str, code: &str) -> Result<Self, KeyError> {
        validate_friend_code(code)?;
        Ok(Self(format!("lookup:{identity}:{code}")))
    }

    /// Announcements are cached once for all identities.
    pub fn announcements() -> Self {
        Self("announcements".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Friend codes are digit groups in a fixed 4-4-4 pattern.
pub fn validate_friend_code(code: &str) -> Result<(), KeyError> {
    let bytes = code.as_bytes();
    if bytes.len() != 14 {
        return Err(KeyError::BadFriendCode);
    }
    for (i, b) in bytes.iter().enumerate() {
        let ok = match i {
            4 | 9 => *b == b'-',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return Err(KeyError::BadFriendCode);
        }
    }
    Ok(())
}

/// User ids are 16-digit account numbers.
pub fn validate_user_id(id: &str) -> Result<(), KeyError> {
    if id.len() == 16 && id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(KeyError::BadUserId)
    }
}

/// A fresh read out of the cache.
#[derive(Debug, Clone)]
pub struct Snapshot<V> {
    pub value: V,
    /// When this value was fetched, epoch milliseconds.
    pub updated: u64,
    /// Remaining freshness, for `Cache-Control: max-age`.
    pub max_age: Duration,
}

struct Entry<V> {
    value: V,
    updated: u64,
    updated_at: Instant,
    ttl: Duration,
}

impl<V: Clone> Entry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            updated: now_ms(),
            updated_at: Instant::now(),
            ttl,
        }
    }

    fn fresh(&self) -> bool {
        self.updated_at.elapsed() < self.ttl
    }

    fn snapshot(&self) -> Snapshot<V> {
        Snapshot {
            value: self.value.clone(),
            updated: self.updated,
            max_age: self
                .ttl
                .saturating_sub(self.updated_at.elapsed()),
        }
    }
}

type FetchOutcome<V> = Result<Snapshot<V>, Arc<UpstreamError>>;
type InFlight<V> = Shared<BoxFuture<'static, FetchOutcome<V>>>;

/// Per-key TTL cache with single-flight fetch semantics.
pub struct TtlCache<V: Clone> {
    entries: Arc<DashMap<CacheKey, Entry<V>>>,
    inflight: Arc<DashMap<CacheKey, InFlight<V>>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Entries currently held, fresh or stale.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. In-flight fetches still complete and repopulate.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Return the cached value if fresh, otherwise fetch it — joining the
    /// in-flight fetch if one exists, starting it otherwise. Every caller
    /// that joined the same fetch receives the same snapshot or the same
    /// error instance.
    pub async fn get_or_fetch<F>(&self, key: CacheKey, ttl: Duration, fetch: F) -> FetchOutcome<V>
    where
        F: std::future::Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        self.get_or_fetch_with(key, fetch, move |_| ttl).await
    }

    async fn get_or_fetch_with<F, T>(&self, key: CacheKey, fetch: F, ttl_for: T) -> FetchOutcome<V>
    where
        F: std::future::Future<Output = Result<V, UpstreamError>> + Send + 'static,
        T: FnOnce(&V) -> Duration + Send + 'static,
    {
        if let Some(entry) = self.entries.get(&key) {
            if entry.fresh() {
                tracing::trace!(key = key.as_str(), "cache hit");
                return Ok(entry.snapshot());
            }
        }

        let flight = self.join_or_start(key, fetch, ttl_for);
        flight.await
    }

    /// Join the in-flight fetch for `key`, or start one. The shared future
    /// removes itself from the in-flight table the instant it settles and
    /// stores the entry only on success.
    fn join_or_start<F, T>(&self, key: CacheKey, fetch: F, ttl_for: T) -> InFlight<V>
    where
        F: std::future::Future<Output = Result<V, UpstreamError>> + Send + 'static,
        T: FnOnce(&V) -> Duration + Send + 'static,
    {
        match self.inflight.entry(key.clone()) {
            Slot::Occupied(slot) => {
                tracing::trace!(key = key.as_str(), "joining in-flight fetch");
                slot.get().clone()
            }
            Slot::Vacant(slot) => {
                let entries = self.entries.clone();
                let inflight = self.inflight.clone();
                let flight = async move {
                    let outcome = fetch.await;
                    inflight.remove(&key);
                    match outcome {
                        Ok(value) => {
                            let ttl = ttl_for(&value);
                            let entry = Entry::new(value, ttl);
                            let snapshot = entry.snapshot();
                            entries.insert(key, entry);
                            Ok(snapshot)
                        }
                        Err(err) => Err(Arc::new(err)),
                    }
                }
                .boxed()
                .shared();
                slot.insert(flight.clone());
                flight
            }
        }
    }
}

impl<T> TtlCache<Option<T>>
where
    T: Clone + Send + Sync + 'static,
{
    /// Lookup variant with negative caching: a fetch that resolves to `None`
    /// ("entity definitively absent") is cached too, under the longer
    /// `negative_ttl`, so known-missing lookups stop hitting the upstream.
    pub async fn get_or_lookup<F>(
        &self,
        key: CacheKey,
        ttl: Duration,
        negative_ttl: Duration,
        fetch: F,
    ) -> FetchOutcome<Option<T>>
    where
        F: std::future::Future<Output = Result<Option<T>, UpstreamError>> + Send + 'static,
    {
        self.get_or_fetch_with(key, fetch, move |value| {
            if value.is_some() {
                ttl
            } else {
                negative_ttl
            }
        })
        .await
    }
}
