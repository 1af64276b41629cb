//! `TandemBuilder`: session configuration and spawning.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_budget::{BudgetSync, RecordStore};
use tandem_game::ConnectFour;
use tandem_link::{HeartbeatConfig, ReconnectConfig};
use tandem_protocol::JsonCodec;
use tandem_session::{SessionConfig, SessionHandle, SessionProtocol, spawn_session};
use tandem_transport::Signaling;
use tracing::debug;

use crate::{BudgetSession, GameSession};

/// Builder for configuring and starting sessions.
///
/// Every session spawned from one builder shares its configuration. The
/// wire codec is JSON. A builder (de)serializes as its [`SessionConfig`],
/// so it can be loaded from a config file.
///
/// # Example
///
/// ```rust,ignore
/// use tandem::prelude::*;
///
/// let hub = MemoryHub::new();
/// let session = TandemBuilder::new()
///     .register_timeout(Duration::from_secs(5))
///     .spawn(hub.signaling(), ConnectFour::new("Ada"));
/// let code = session.host().await?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TandemBuilder {
    config: SessionConfig,
}

impl TandemBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    /// Replaces the whole session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register_timeout(mut self, timeout: Duration) -> Self {
        self.config.register_timeout = timeout;
        self
    }

    /// How many fresh peer codes to try when registration collides.
    pub fn max_collision_retries(mut self, retries: u32) -> Self {
        self.config.max_collision_retries = retries;
        self
    }

    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn command_buffer(mut self, capacity: usize) -> Self {
        self.config.command_buffer = capacity;
        self
    }

    /// The configuration sessions will run with, after clamping.
    pub fn config(&self) -> SessionConfig {
        self.config.clone().validated()
    }

    /// Spawns a session actor for `protocol` on the current tokio runtime.
    ///
    /// The actor is idle until [`SessionHandle::host`] or
    /// [`SessionHandle::join`] is called.
    pub fn spawn<S, P>(&self, signaling: S, protocol: P) -> SessionHandle<P>
    where
        S: Signaling,
        P: SessionProtocol,
    {
        let config = self.config();
        debug!(
            register_timeout = ?config.register_timeout,
            heartbeat = ?config.heartbeat.interval,
            max_retries = config.reconnect.max_retries,
            "spawning session"
        );
        spawn_session(signaling, protocol, JsonCodec, config)
    }

    /// Spawns a Connect Four session for a player called `name`.
    pub fn spawn_game<S: Signaling>(&self, signaling: S, name: impl Into<String>) -> GameSession {
        GameSession::new(self.spawn(signaling, ConnectFour::new(name)))
    }

    /// Spawns a budget-sharing session over `store`.
    pub fn spawn_budget<S: Signaling, R: RecordStore>(&self, signaling: S, store: R) -> BudgetSession<R> {
        BudgetSession::new(self.spawn(signaling, BudgetSync::new(store)))
    }
}

impl Default for TandemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_session_defaults() {
        assert_eq!(TandemBuilder::default().config(), SessionConfig::default());
    }

    #[test]
    fn test_builder_setters_apply() {
        let heartbeat = HeartbeatConfig {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(2),
        };
        let cfg = TandemBuilder::new()
            .register_timeout(Duration::from_secs(3))
            .max_collision_retries(2)
            .heartbeat(heartbeat)
            .command_buffer(8)
            .config();
        assert_eq!(cfg.register_timeout, Duration::from_secs(3));
        assert_eq!(cfg.max_collision_retries, 2);
        assert_eq!(cfg.heartbeat, heartbeat);
        assert_eq!(cfg.command_buffer, 8);
    }

    #[test]
    fn test_builder_loads_from_json() {
        let defaults = serde_json::to_value(SessionConfig::default()).unwrap();
        let mut json = defaults.clone();
        json["max_collision_retries"] = 9.into();
        let builder: TandemBuilder = serde_json::from_value(json).unwrap();
        assert_eq!(builder.config().max_collision_retries, 9);
        assert_eq!(serde_json::to_value(TandemBuilder::new()).unwrap(), defaults);
    }

    #[test]
    fn test_builder_config_is_clamped() {
        let cfg = TandemBuilder::new()
            .max_collision_retries(0)
            .heartbeat(HeartbeatConfig {
                interval: Duration::from_millis(1),
                timeout: Duration::ZERO,
            })
            .config();
        assert_eq!(cfg.max_collision_retries, 1);
        assert_eq!(cfg.heartbeat.interval, HeartbeatConfig::MIN_INTERVAL);
        assert_eq!(cfg.heartbeat.timeout, HeartbeatConfig::MIN_INTERVAL);
    }
}
