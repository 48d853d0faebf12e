//! Structured upstream failure, shared by every collaborator call.

use serde::Serialize;

/// Machine-readable classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// Credential rejected or handshake failed.
    Auth,
    /// The entity definitively does not exist.
    NotFound,
    /// The upstream asked us to back off.
    RateLimited,
    /// Network-level failure reaching the upstream.
    Transport,
    /// Response received but not understood.
    Protocol,
}

/// A failed upstream call. Never cached — the next caller retries.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    /// HTTP status reported by the upstream, when there was one.
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Auth, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Transport, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Protocol, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == UpstreamErrorKind::NotFound
    }
}
