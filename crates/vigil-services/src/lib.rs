//! vigil-services — the presence synchronization core: coalescing TTL cache,
//! auth gate, peer-link manager, presence publisher, and monitor lifecycle.
//!
//! External collaborators (upstream client, persistence, peer transport,
//! presence diffing) are traits; the daemon wires concrete implementations.

pub mod activity;
pub mod auth;
pub mod cache;
pub mod events;
pub mod link;
pub mod monitor;
pub mod presence;
pub mod store;
pub mod upstream;

pub use activity::{build_activity, Activity, ActivityContext};
pub use auth::AuthGate;
pub use cache::{CacheKey, KeyError, Snapshot, TtlCache};
pub use events::{PresenceDiffer, PresenceEvent, PresenceEventKind};
pub use link::{LinkManager, LinkStatus, LinkError, PeerConnector, PeerFilter, PeerInfo, PeerLink};
pub use monitor::{
    Monitor, MonitorConfigSource, MonitorFactory, MonitorKind, MonitorRegistration, MonitorSet,
    NoMonitorConfig,
};
pub use presence::{PresenceOptions, PresencePublisher, PresenceSnapshot, TitleSession};
pub use store::{MemStore, SavedPresence, Store};
pub use upstream::{AppData, SessionHandle, Upstream};
