//! Monitor lifecycle — pluggable extensions tied to the displayed title.
//!
//! A monitor runs while a qualifying title is active. Reconciliation starts
//! monitors whose kind is newly requested, stops ones no longer requested,
//! and forwards title changes to running instances without restarting them.
//! Config refreshes try the in-place hook first and fall back to a full
//! restart so a monitor is never left half-configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use vigil_core::Title;

/// Stable identifier for a monitor implementation.
pub type MonitorKind = &'static str;

/// A running extension. `enable`/`disable` are required; the change hooks
/// default to no-ops for monitors that don't care.
pub trait Monitor: Send + Sync {
    fn enable(&self);
    fn disable(&self);

    /// The displayed title changed while this monitor stayed requested.
    fn on_change_title(&self, _title: Option<&Title>) {}

    /// Apply new configuration in place. `Ok(true)` = applied; `Ok(false)`
    /// or `Err` = unsupported, the controller restarts the monitor instead.
    fn on_update_config(&self, _config: Option<Value>) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Builds a monitor instance from its config and the title that activated it.
pub type MonitorFactory =
    Arc<dyn Fn(Option<Value>, Option<&Title>) -> Box<dyn Monitor> + Send + Sync>;

/// External source of monitor configuration, consulted on start and refresh.
#[async_trait]
pub trait MonitorConfigSource: Send + Sync {
    async fn config_for(&self, kind: MonitorKind) -> Option<Value>;
}

/// Config source for monitors that take no configuration.
pub struct NoMonitorConfig;

#[async_trait]
impl MonitorConfigSource for NoMonitorConfig {
    async fn config_for(&self, _kind: MonitorKind) -> Option<Value> {
        None
    }
}

/// One pluggable monitor: its kind, which titles activate it, and how to
/// build an instance.
pub struct MonitorRegistration {
    pub kind: MonitorKind,
    pub qualifies: Arc<dyn Fn(&Title) -> bool + Send + Sync>,
    pub factory: MonitorFactory,
}

/// The set of live monitors, reconciled against the current activity.
pub struct MonitorSet {
    registrations: Vec<MonitorRegistration>,
    config: Arc<dyn MonitorConfigSource>,
    live: HashMap<MonitorKind, Box<dyn Monitor>>,
}

impl MonitorSet {
    pub fn new(registrations: Vec<MonitorRegistration>, config: Arc<dyn MonitorConfigSource>) -> Self {
        Self {
            registrations,
            config,
            live: HashMap::new(),
        }
    }

    /// Monitor kinds the given title activates. Usually zero or one.
    pub fn kinds_for(&self, title: Option<&Title>) -> Vec<MonitorKind> {
        let Some(title) = title else {
            return Vec::new();
        };
        self.registrations
            .iter()
            .filter(|reg| (reg.qualifies)(title))
            .map(|reg| reg.kind)
            .collect()
    }

    pub fn live_kinds(&self) -> Vec<MonitorKind> {
        self.live.keys().copied().collect()
    }

    /// Reconcile the live set against the requested kinds for the current
    /// activity. `title_changed` is whether the title identity changed since
    /// the last reconciliation.
    pub async fn reconcile(
        &mut self,
        requested: &[MonitorKind],
        title: Option<&Title>,
        title_changed: bool,
    ) {
        for &kind in requested {
            if self.live.contains_key(kind) {
                if title_changed {
                    if let Some(instance) = self.live.get(kind) {
                        instance.on_change_title(title);
                    }
                }
                continue;
            }

            let Some(factory) = self.factory_for(kind) else {
                tracing::warn!(kind, "no registration for requested monitor");
                continue;
            };
            let config = self.config.config_for(kind).await;
            tracing::debug!(kind, "starting monitor");
            let instance = factory(config, title);
            instance.enable();
            self.live.insert(kind, instance);
        }

        let stale: Vec<MonitorKind> = self
            .live
            .keys()
            .filter(|kind| !requested.contains(kind))
            .copied()
            .collect();
        for kind in stale {
            tracing::debug!(kind, "stopping monitor");
            if let Some(instance) = self.live.remove(kind) {
                instance.disable();
            }
        }
    }

    /// Disable and drop every live monitor.
    pub fn clear(&mut self) {
        for (kind, instance) in self.live.drain() {
            tracing::debug!(kind, "stopping monitor");
            instance.disable();
        }
    }

    /// Refetch config for every live monitor. In-place update when the
    /// monitor supports it; otherwise tear down and recreate with the new
    /// config rather than leave it inconsistent.
    pub async fn refresh_configs(&mut self) {
        let kinds = self.live_kinds();
        for kind in kinds {
            let config = self.config.config_for(kind).await;
            let applied = self
                .live
                .get(&kind)
                .map(|instance| instance.on_update_config(config.clone()))
                .unwrap_or(Ok(true));
            match applied {
                Ok(true) => {
                    tracing::debug!(kind, "monitor config updated in place");
                }
                Ok(false) => self.restart(kind, config),
                Err(err) => {
                    tracing::warn!(kind, error = %err, "monitor config update failed");
                    self.restart(kind, config);
                }
            }
        }
    }

    fn restart(&mut self, kind: MonitorKind, config: Option<Value>) {
        let Some(factory) = self.factory_for(kind) else {
            return;
        };
        if let Some(existing) = self.live.remove(kind) {
            tracing::debug!(kind, "restarting monitor");
            existing.disable();
        }
        let instance = factory(config, None);
        instance.enable();
        self.live.insert(kind, instance);
    }

    fn factory_for(&self, kind: MonitorKind) -> Option<MonitorFactory> {
        self.registrations
            .iter()
            .find(|reg| reg.kind == kind)
            .map(|reg| reg.factory.clone())
    }
}
