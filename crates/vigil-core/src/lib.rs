//! vigil-core — shared types: configuration, presence data model, scoped-token
//! policy, and the structured upstream error. All other Vigil crates depend on
//! this one.

pub mod config;
pub mod error;
pub mod model;
pub mod policy;

pub use error::{UpstreamError, UpstreamErrorKind};
pub use model::{
    now_ms, ActiveEvent, Announcement, Friend, FriendCodeInfo, Presence, PresenceState, Profile,
    RemoteUser, Title, WebService, WebServiceToken,
};
pub use policy::{ScopedToken, TokenPolicy};
