//! Vigil integration test harness.
//!
//! Drives the real axum router over TCP with mock collaborators: a
//! scriptable upstream with per-method call counters, the in-memory store,
//! and a minimal differ. Each test spawns its own server on an ephemeral
//! port.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use vigil_core::{
    ActiveEvent, Announcement, Friend, FriendCodeInfo, Presence, PresenceState, Profile,
    RemoteUser, Title, UpstreamError, WebService, WebServiceToken,
};
use vigil_services::{
    auth, AuthGate, MemStore, PresenceDiffer, PresenceEvent, PresenceEventKind, SessionHandle,
    Upstream,
};

use vigil_api::handlers::EntityCaches;
use vigil_api::ApiState;

mod caching;
mod stream;
mod tokens;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const IDENTITY: &str = "1111222233334444";
pub const SECRET: &str = "secret-1";

/// Scriptable upstream with call counters.
#[derive(Default)]
pub struct MockUpstream {
    pub handshakes: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub friends_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    pub friends: Mutex<Vec<Friend>>,
    pub lookups: Mutex<HashMap<String, RemoteUser>>,
    pub fail_friends: AtomicBool,
}

impl MockUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_friends(&self, friends: Vec<Friend>) {
        *self.friends.lock().unwrap() = friends;
    }

    pub fn add_lookup(&self, code: &str, user: RemoteUser) {
        self.lookups.lock().unwrap().insert(code.to_string(), user);
    }
}

pub fn offline_friend(id: &str) -> Friend {
    Friend {
        id: id.to_string(),
        name: format!("Friend {id}"),
        image_url: None,
        is_favorite: false,
        presence: Presence::offline(),
    }
}

pub fn playing_friend(id: &str, title_id: &str) -> Friend {
    Friend {
        id: id.to_string(),
        name: format!("Friend {id}"),
        image_url: None,
        is_favorite: false,
        presence: Presence {
            state: PresenceState::Playing,
            updated_at: 1_700_000_100,
            logout_at: 0,
            title: Some(Title {
                id: title_id.to_string(),
                name: format!("Game {title_id}"),
                image_url: None,
                description: None,
                total_play_time: 60,
                first_played_at: 0,
            }),
        },
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn authenticate(&self, secret: &str) -> Result<SessionHandle, UpstreamError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if secret != SECRET {
            return Err(UpstreamError::auth("unknown secret"));
        }
        Ok(SessionHandle {
            identity: IDENTITY.to_string(),
            presence_id: "p-me".to_string(),
            display_name: "Me".to_string(),
            access_token: "upstream-token".to_string(),
            issued_at: 0,
        })
    }

    async fn fetch_profile(&self, _session: &SessionHandle) -> Result<Profile, UpstreamError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Profile {
            id: "p-me".to_string(),
            name: "Me".to_string(),
            image_url: None,
            friend_code: Some("1111-2222-3333".to_string()),
            presence: Presence::offline(),
        })
    }

    async fn fetch_friends(&self, _session: &SessionHandle) -> Result<Vec<Friend>, UpstreamError> {
        self.friends_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_friends.load(Ordering::SeqCst) {
            return Err(UpstreamError::transport("upstream unreachable"));
        }
        Ok(self.friends.lock().unwrap().clone())
    }

    async fn fetch_web_services(
        &self,
        _session: &SessionHandle,
    ) -> Result<Vec<WebService>, UpstreamError> {
        Ok(vec![WebService {
            id: 1,
            name: "Companion".to_string(),
            uri: "https://companion.example".to_string(),
            image_url: None,
        }])
    }

    async fn fetch_active_event(
        &self,
        _session: &SessionHandle,
    ) -> Result<Option<ActiveEvent>, UpstreamError> {
        Ok(None)
    }

    async fn fetch_announcements(
        &self,
        _session: &SessionHandle,
    ) -> Result<Vec<Announcement>, UpstreamError> {
        Ok(vec![Announcement {
            id: 1,
            title: "Maintenance".to_string(),
            text: "Scheduled maintenance".to_string(),
            date: 0,
        }])
    }

    async fn fetch_user(
        &self,
        _session: &SessionHandle,
        id: &str,
    ) -> Result<RemoteUser, UpstreamError> {
        Ok(RemoteUser {
            id: id.to_string(),
            name: format!("User {id}"),
            image_url: None,
        })
    }

    async fn fetch_event(
        &self,
        _session: &SessionHandle,
        id: u64,
    ) -> Result<ActiveEvent, UpstreamError> {
        Ok(ActiveEvent {
            id,
            name: "Event".to_string(),
            description: None,
            share_url: None,
        })
    }

    async fn lookup_by_code(
        &self,
        _session: &SessionHandle,
        code: &str,
    ) -> Result<Option<RemoteUser>, UpstreamError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookups.lock().unwrap().get(code).cloned())
    }

    async fn friend_code_info(
        &self,
        _session: &SessionHandle,
    ) -> Result<FriendCodeInfo, UpstreamError> {
        Ok(FriendCodeInfo {
            code: "1111-2222-3333".to_string(),
            url: "https://lookup.example/1111-2222-3333".to_string(),
        })
    }

    async fn web_service_token(
        &self,
        _session: &SessionHandle,
        _id: u64,
    ) -> Result<WebServiceToken, UpstreamError> {
        Ok(WebServiceToken {
            access_token: "ws-token".to_string(),
            expires_in: 7200,
        })
    }

    async fn set_favorite(
        &self,
        _session: &SessionHandle,
        _friend_id: &str,
        _favorite: bool,
    ) -> Result<(), UpstreamError> {
        Ok(())
    }
}

/// Minimal differ: online/offline transitions only. The production differ is
/// a collaborator of the daemon binary; the API forwards whatever the
/// configured differ produces.
pub struct TestDiffer;

impl PresenceDiffer for TestDiffer {
    fn diff(&self, prev: &[Friend], next: &[Friend]) -> Vec<PresenceEvent> {
        let before: HashMap<&str, &Friend> = prev.iter().map(|f| (f.id.as_str(), f)).collect();
        let mut events = Vec::new();
        for friend in next {
            let Some(old) = before.get(friend.id.as_str()) else {
                continue;
            };
            let was = old.presence.state.is_online();
            let is = friend.presence.state.is_online();
            if was != is {
                events.push(PresenceEvent {
                    kind: if is {
                        PresenceEventKind::FriendOnline
                    } else {
                        PresenceEventKind::FriendOffline
                    },
                    id: friend.id.clone(),
                    presence: friend.presence.clone(),
                    prev: Some(old.presence.clone()),
                });
            }
        }
        events
    }
}

pub struct TestServer {
    pub base: String,
    pub upstream: Arc<MockUpstream>,
    pub store: Arc<MemStore>,
    pub http: reqwest::Client,
}

pub struct ServerOptions {
    pub update_interval: Duration,
    pub lookup_ttl: Duration,
    pub negative_lookup_ttl: Duration,
    pub session_idle: Duration,
    pub sweep_interval: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(30),
            lookup_ttl: Duration::from_secs(60),
            negative_lookup_ttl: Duration::from_secs(120),
            session_idle: Duration::from_secs(60),
            sweep_interval: None,
        }
    }
}

/// Spawn the full router on an ephemeral port with mock collaborators.
pub async fn spawn_server(options: ServerOptions) -> TestServer {
    let upstream = MockUpstream::new();
    upstream.set_friends(vec![offline_friend("A"), offline_friend("B")]);

    let store = Arc::new(MemStore::new());
    store.put_identity_secret(IDENTITY, SECRET);

    let gate = Arc::new(AuthGate::new(
        upstream.clone(),
        store.clone(),
        options.session_idle,
    ));
    if let Some(sweep) = options.sweep_interval {
        tokio::spawn(auth::expiry_loop(gate.clone(), sweep));
    }

    let state = ApiState {
        gate,
        upstream: upstream.clone(),
        store: store.clone(),
        differ: Arc::new(TestDiffer),
        caches: Arc::new(EntityCaches::default()),
        require_secret: true,
        update_interval: options.update_interval,
        lookup_ttl: options.lookup_ttl,
        negative_lookup_ttl: options.negative_lookup_ttl,
        announcement_ttl: Duration::from_secs(60),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, vigil_api::router(state)).await;
    });

    TestServer {
        base: format!("http://{}/api/presence", addr),
        upstream,
        store,
        http: reqwest::Client::new(),
    }
}

impl TestServer {
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base, path))
            .header("Authorization", format!("Secret {SECRET}"))
    }

    pub fn get_with_token(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base, path))
            .header("Authorization", format!("Bearer {token}"))
    }

    pub fn get_anonymous(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.get(format!("{}{}", self.base, path))
    }
}
