//! Timing configuration for the link layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Heartbeat timing.
///
/// A ping is sent every `interval`; the link is declared dead when no pong
/// has arrived for longer than `timeout`. The timeout should span at least
/// two intervals so one lost ping is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2_000),
            timeout: Duration::from_millis(5_000),
        }
    }
}

impl HeartbeatConfig {
    /// Smallest interval accepted; anything lower is clamped.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// - `interval` raised to [`Self::MIN_INTERVAL`].
    /// - `timeout` raised to `interval` (a shorter timeout would fire
    ///   before the first pong could ever arrive).
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(interval = ?self.interval, "heartbeat interval too small, clamping");
            self.interval = Self::MIN_INTERVAL;
        }
        if self.timeout < self.interval {
            warn!(
                timeout = ?self.timeout,
                interval = ?self.interval,
                "heartbeat timeout shorter than interval, clamping"
            );
            self.timeout = self.interval;
        }
        self
    }
}

/// Exponential backoff for reconnection attempts.
///
/// The delay before attempt `n` (1-based) is
/// `min(base_delay * factor^n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Attempts made before giving up. `0` disables reconnection.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            factor: 1.5,
            max_retries: 5,
        }
    }
}

impl ReconnectConfig {
    /// Clamp out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if !self.factor.is_finite() || self.factor < 1.0 {
            warn!(factor = self.factor, "backoff factor must be >= 1.0, clamping");
            self.factor = 1.0;
        }
        if self.max_delay < self.base_delay {
            self.max_delay = self.base_delay;
        }
        self
    }

    /// Delay before retry attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_defaults() {
        let cfg = HeartbeatConfig::default();
        assert_eq!(cfg.interval, Duration::from_secs(2));
        assert_eq!(cfg.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_heartbeat_validated_raises_timeout_to_interval() {
        let cfg = HeartbeatConfig {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(1),
        }
        .validated();
        assert_eq!(cfg.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_delay_for_follows_backoff_formula() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.delay_for(1), Duration::from_millis(1_500));
        assert_eq!(cfg.delay_for(2), Duration::from_millis(2_250));
        assert_eq!(cfg.delay_for(3), Duration::from_micros(3_375_000));
        assert_eq!(cfg.delay_for(4), Duration::from_micros(5_062_500));
        assert_eq!(cfg.delay_for(5), Duration::from_micros(7_593_750));
    }

    #[test]
    fn test_delay_for_is_capped() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.delay_for(6), Duration::from_secs(10));
        assert_eq!(cfg.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_reconnect_validated_clamps_factor() {
        let cfg = ReconnectConfig {
            factor: 0.5,
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.factor, 1.0);
        assert_eq!(cfg.delay_for(3), Duration::from_secs(1));
    }
}
