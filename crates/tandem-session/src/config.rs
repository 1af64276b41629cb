//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_link::{HeartbeatConfig, ReconnectConfig};

/// Configuration for one session actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long registration with the rendezvous service may take before
    /// the session reports the service as unavailable.
    pub register_timeout: Duration,

    /// How many fresh codes to try when the rendezvous service reports a
    /// collision.
    pub max_collision_retries: u32,

    pub heartbeat: HeartbeatConfig,

    pub reconnect: ReconnectConfig,

    /// Capacity of the actor's command queue. Callers wait when it is full.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            register_timeout: Duration::from_secs(15),
            max_collision_retries: 5,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            command_buffer: 64,
        }
    }
}

impl SessionConfig {
    /// Clamp out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.max_collision_retries = self.max_collision_retries.max(1);
        self.command_buffer = self.command_buffer.max(1);
        self.heartbeat = self.heartbeat.validated();
        self.reconnect = self.reconnect.validated();
        self
    }
}
