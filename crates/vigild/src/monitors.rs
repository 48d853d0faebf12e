//! Companion monitor — keeps a web-service token warm while a qualifying
//! title is displayed.
//!
//! Companion web apps reject stale tokens, and fetching one on demand adds
//! seconds of latency right when the user opens the app. While the title is
//! active this monitor refreshes the token in the background; when the title
//! goes away the monitor is disabled and the refresh task aborted.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use vigil_core::Title;
use vigil_services::{
    AuthGate, Monitor, MonitorFactory, MonitorKind, MonitorRegistration, Upstream,
};

pub const TOKEN_WARM_KIND: MonitorKind = "token-warm";

const DEFAULT_REFRESH_SECS: u64 = 900;

#[derive(Debug, Clone, Deserialize)]
struct TokenWarmConfig {
    /// Web service whose token is kept warm.
    webservice: u64,
    #[serde(default = "default_refresh_secs")]
    refresh_secs: u64,
}

fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}

struct Shared {
    upstream: Arc<dyn Upstream>,
    gate: Arc<AuthGate>,
    secret: String,
}

impl Shared {
    async fn refresh_once(&self, webservice: u64) {
        let session = match self.gate.resolve(&self.secret).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "token warm: session resolve failed");
                return;
            }
        };
        match self.upstream.web_service_token(&session, webservice).await {
            Ok(token) => {
                tracing::debug!(webservice, expires_in = token.expires_in, "web-service token warmed");
            }
            Err(err) => {
                tracing::warn!(webservice, error = %err, "token warm fetch failed");
            }
        }
    }
}

pub struct TokenWarmMonitor {
    shared: Arc<Shared>,
    config: std::sync::Mutex<TokenWarmConfig>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TokenWarmMonitor {
    fn parse_config(config: Option<&Value>) -> Option<TokenWarmConfig> {
        config.and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    fn spawn_refresh(&self) -> Option<JoinHandle<()>> {
        let config = self.config.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let shared = self.shared.clone();
        Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(config.refresh_secs.max(1)));
            loop {
                interval.tick().await;
                shared.refresh_once(config.webservice).await;
            }
        }))
    }
}

impl Monitor for TokenWarmMonitor {
    fn enable(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_none() {
            *task = self.spawn_refresh();
        }
    }

    fn disable(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    fn on_change_title(&self, title: Option<&Title>) {
        tracing::debug!(
            title = title.map(|t| t.id.as_str()).unwrap_or("none"),
            "token warm: title changed"
        );
    }

    fn on_update_config(&self, config: Option<Value>) -> anyhow::Result<bool> {
        let Some(new) = Self::parse_config(config.as_ref()) else {
            anyhow::bail!("token warm config missing or malformed");
        };
        let mut current = self.config.lock().unwrap_or_else(|e| e.into_inner());
        if current.webservice != new.webservice {
            // A different web service needs a fresh session and task.
            return Ok(false);
        }
        let interval_changed = current.refresh_secs != new.refresh_secs;
        *current = new;
        drop(current);

        if interval_changed {
            // Restart just the refresh task with the new cadence.
            self.disable();
            self.enable();
        }
        Ok(true)
    }
}

/// Registration wiring: the monitor activates for the configured title ids.
pub fn registration(
    upstream: Arc<dyn Upstream>,
    gate: Arc<AuthGate>,
    secret: String,
    monitor_titles: Vec<String>,
) -> MonitorRegistration {
    let shared = Arc::new(Shared {
        upstream,
        gate,
        secret,
    });
    let factory: MonitorFactory = Arc::new(move |config, _title| {
        let config = TokenWarmMonitor::parse_config(config.as_ref()).unwrap_or(TokenWarmConfig {
            webservice: 0,
            refresh_secs: DEFAULT_REFRESH_SECS,
        });
        Box::new(TokenWarmMonitor {
            shared: shared.clone(),
            config: std::sync::Mutex::new(config),
            task: std::sync::Mutex::new(None),
        })
    });

    MonitorRegistration {
        kind: TOKEN_WARM_KIND,
        qualifies: Arc::new(move |title: &Title| monitor_titles.iter().any(|id| *id == title.id)),
        factory,
    }
}
