//! Configuration system for Vigil.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $VIGIL_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/vigil/config.toml
//!   3. ~/.config/vigil/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub peer: PeerConfig,
    pub presence: PresenceConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port for the HTTP API.
    pub listen_port: u16,
    /// If false, requests may name a known identity with `?identity=` and use
    /// its stored secret instead of presenting one.
    pub require_secret: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the remote account service. Must be set.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window for per-identity entities (profile, friends, app data).
    pub update_interval_secs: u64,
    /// Freshness window for positive friend-code lookups.
    pub lookup_ttl_secs: u64,
    /// Freshness window for friend-code lookups that resolved to "no such
    /// user". Independent of the positive TTL.
    pub negative_lookup_ttl_secs: u64,
    /// Freshness window for the global announcements cache.
    pub announcement_ttl_secs: u64,
    /// Authenticated sessions idle longer than this are evicted.
    pub session_idle_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Peer application identity to attach to when no title selects one.
    pub target: String,
    /// Seconds between connection attempts to the display peer.
    pub reconnect_interval_secs: u64,
    /// Keep the peer link warm when there is nothing to display, sending an
    /// explicit offline activity instead of disconnecting.
    pub preconnect: bool,
    /// Directory scanned for display-peer sockets. Empty = runtime dir.
    pub socket_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Identity whose roster is polled for display. Empty = display disabled.
    pub identity: String,
    /// Presence id to display. Empty = the identity's own presence.
    pub user: String,
    pub show_friend_code: bool,
    /// Overrides the friend code shown, if any.
    pub force_friend_code: String,
    pub show_active_event: bool,
    /// Display the "online but not playing" idle state.
    pub show_inactive: bool,
    /// Title ids that activate the companion monitor.
    pub monitor_titles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            peer: PeerConfig::default(),
            presence: PresenceConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: 3090,
            require_secret: true,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 30,
            lookup_ttl_secs: 86_400,           // 24 hours
            negative_lookup_ttl_secs: 604_800, // 7 days
            announcement_ttl_secs: 86_400,
            session_idle_secs: 1_800, // 30 minutes
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            target: "vigil.display.default".to_string(),
            reconnect_interval_secs: 5,
            preconnect: false,
            socket_dir: String::new(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            user: String::new(),
            show_friend_code: false,
            force_friend_code: String::new(),
            show_active_event: false,
            show_inactive: false,
            monitor_titles: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: data_dir(),
        }
    }
}

impl CacheConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn lookup_ttl(&self) -> Duration {
        Duration::from_secs(self.lookup_ttl_secs)
    }

    pub fn negative_lookup_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_lookup_ttl_secs)
    }

    pub fn announcement_ttl(&self) -> Duration {
        Duration::from_secs(self.announcement_ttl_secs)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

impl PeerConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("vigil")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("vigil")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl VigilConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            VigilConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("VIGIL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&VigilConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply VIGIL_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VIGIL_SERVER__LISTEN_PORT") {
            if let Ok(p) = v.parse() {
                self.server.listen_port = p;
            }
        }
        if let Ok(v) = std::env::var("VIGIL_SERVER__REQUIRE_SECRET") {
            self.server.require_secret = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("VIGIL_UPSTREAM__BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Ok(v) = std::env::var("VIGIL_CACHE__UPDATE_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                self.cache.update_interval_secs = s;
            }
        }
        if let Ok(v) = std::env::var("VIGIL_PEER__PRECONNECT") {
            self.peer.preconnect = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("VIGIL_PRESENCE__IDENTITY") {
            self.presence.identity = v;
        }
        if let Ok(v) = std::env::var("VIGIL_PRESENCE__USER") {
            self.presence.user = v;
        }
    }
}
