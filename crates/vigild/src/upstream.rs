//! Reqwest-backed upstream adapter.
//!
//! The remote account protocol is not this daemon's concern; this adapter
//! maps the `Upstream` trait onto a plain JSON-over-HTTP surface and turns
//! transport/status failures into structured `UpstreamError`s.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use vigil_core::{
    ActiveEvent, Announcement, Friend, FriendCodeInfo, Profile, RemoteUser, UpstreamError,
    UpstreamErrorKind, WebService, WebServiceToken,
};
use vigil_services::{SessionHandle, Upstream};

pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: Option<&SessionHandle>,
        path: &str,
    ) -> Result<T, UpstreamError> {
        let mut request = self.client.get(self.url(path));
        if let Some(session) = session {
            request = request.bearer_auth(&session.access_token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        session: &SessionHandle,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&session.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            let kind = match status.as_u16() {
                401 | 403 => UpstreamErrorKind::Auth,
                404 => UpstreamErrorKind::NotFound,
                429 => UpstreamErrorKind::RateLimited,
                _ => UpstreamErrorKind::Protocol,
            };
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new(kind, message).with_status(status.as_u16()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::protocol(e.to_string()))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn authenticate(&self, secret: &str) -> Result<SessionHandle, UpstreamError> {
        #[derive(serde::Deserialize)]
        struct AuthResponse {
            identity: String,
            presence_id: String,
            display_name: String,
            access_token: String,
            issued_at: u64,
        }

        let response = self
            .client
            .post(self.url("/v1/sessions"))
            .json(&json!({ "secret": secret }))
            .send()
            .await
            .map_err(|e| UpstreamError::transport(e.to_string()))?;
        let auth: AuthResponse = Self::decode(response).await.map_err(|mut err| {
            // Handshake rejections are auth failures whatever the status.
            if err.kind == UpstreamErrorKind::Protocol {
                err.kind = UpstreamErrorKind::Auth;
            }
            err
        })?;

        Ok(SessionHandle {
            identity: auth.identity,
            presence_id: auth.presence_id,
            display_name: auth.display_name,
            access_token: auth.access_token,
            issued_at: auth.issued_at,
        })
    }

    async fn fetch_profile(&self, session: &SessionHandle) -> Result<Profile, UpstreamError> {
        self.get_json(Some(session), "/v1/me").await
    }

    async fn fetch_friends(&self, session: &SessionHandle) -> Result<Vec<Friend>, UpstreamError> {
        self.get_json(Some(session), "/v1/friends").await
    }

    async fn fetch_web_services(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<WebService>, UpstreamError> {
        self.get_json(Some(session), "/v1/webservices").await
    }

    async fn fetch_active_event(
        &self,
        session: &SessionHandle,
    ) -> Result<Option<ActiveEvent>, UpstreamError> {
        self.get_json(Some(session), "/v1/events/active").await
    }

    async fn fetch_announcements(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<Announcement>, UpstreamError> {
        self.get_json(Some(session), "/v1/announcements").await
    }

    async fn fetch_user(
        &self,
        session: &SessionHandle,
        id: &str,
    ) -> Result<RemoteUser, UpstreamError> {
        self.get_json(Some(session), &format!("/v1/users/{id}")).await
    }

    async fn fetch_event(
        &self,
        session: &SessionHandle,
        id: u64,
    ) -> Result<ActiveEvent, UpstreamError> {
        self.get_json(Some(session), &format!("/v1/events/{id}")).await
    }

    async fn lookup_by_code(
        &self,
        session: &SessionHandle,
        code: &str,
    ) -> Result<Option<RemoteUser>, UpstreamError> {
        match self
            .get_json::<RemoteUser>(Some(session), &format!("/v1/lookup/{code}"))
            .await
        {
            Ok(user) => Ok(Some(user)),
            // "No user holds this code" is an answer, not a failure.
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn friend_code_info(
        &self,
        session: &SessionHandle,
    ) -> Result<FriendCodeInfo, UpstreamError> {
        self.get_json(Some(session), "/v1/me/friendcode").await
    }

    async fn web_service_token(
        &self,
        session: &SessionHandle,
        id: u64,
    ) -> Result<WebServiceToken, UpstreamError> {
        self.get_json(Some(session), &format!("/v1/webservices/{id}/token"))
            .await
    }

    async fn set_favorite(
        &self,
        session: &SessionHandle,
        friend_id: &str,
        favorite: bool,
    ) -> Result<(), UpstreamError> {
        let _: serde_json::Value = self
            .post_json(
                session,
                &format!("/v1/friends/{friend_id}"),
                &json!({ "is_favorite": favorite }),
            )
            .await?;
        Ok(())
    }
}
