//! Contract with the remote account service.
//!
//! The wire protocol lives behind this trait; the core only sees async
//! call-and-result operations that fail with a structured [`UpstreamError`].

use async_trait::async_trait;

use vigil_core::{
    ActiveEvent, Announcement, Friend, FriendCodeInfo, Profile, RemoteUser, UpstreamError,
    WebService, WebServiceToken,
};

/// An authenticated upstream session, produced by a handshake and cached by
/// the auth gate. Shared read-only by every request running for the identity.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Stable account identity (16-digit id).
    pub identity: String,
    /// Id under which this account appears in presence data.
    pub presence_id: String,
    pub display_name: String,
    /// Opaque upstream session credential.
    pub access_token: String,
    /// Epoch seconds.
    pub issued_at: u64,
}

/// Web services and active event are fetched together, as one freshness unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppData {
    pub webservices: Vec<WebService>,
    pub active_event: Option<ActiveEvent>,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Exchange an identity secret for a session. Called at most once per
    /// secret per process by the auth gate.
    async fn authenticate(&self, secret: &str) -> Result<SessionHandle, UpstreamError>;

    async fn fetch_profile(&self, session: &SessionHandle) -> Result<Profile, UpstreamError>;

    async fn fetch_friends(&self, session: &SessionHandle) -> Result<Vec<Friend>, UpstreamError>;

    async fn fetch_web_services(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<WebService>, UpstreamError>;

    async fn fetch_active_event(
        &self,
        session: &SessionHandle,
    ) -> Result<Option<ActiveEvent>, UpstreamError>;

    async fn fetch_announcements(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<Announcement>, UpstreamError>;

    /// Resolve an account by its 16-digit id.
    async fn fetch_user(
        &self,
        session: &SessionHandle,
        id: &str,
    ) -> Result<RemoteUser, UpstreamError>;

    async fn fetch_event(
        &self,
        session: &SessionHandle,
        id: u64,
    ) -> Result<ActiveEvent, UpstreamError>;

    /// Resolve an account by friend code. `None` means the code is valid but
    /// unassigned — that outcome is data and gets negative-cached.
    async fn lookup_by_code(
        &self,
        session: &SessionHandle,
        code: &str,
    ) -> Result<Option<RemoteUser>, UpstreamError>;

    /// The session account's own friend code and share URL.
    async fn friend_code_info(
        &self,
        session: &SessionHandle,
    ) -> Result<FriendCodeInfo, UpstreamError>;

    async fn web_service_token(
        &self,
        session: &SessionHandle,
        id: u64,
    ) -> Result<WebServiceToken, UpstreamError>;

    async fn set_favorite(
        &self,
        session: &SessionHandle,
        friend_id: &str,
        favorite: bool,
    ) -> Result<(), UpstreamError>;
}
