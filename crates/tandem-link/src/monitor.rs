//! Heartbeat-based liveness detection.
//!
//! A channel can stay "open" long after the peer has gone (a laptop lid
//! closed, a phone switched networks). The [`LinkMonitor`] catches this by
//! pinging every `interval` and declaring the link dead when no pong has
//! arrived for longer than `timeout`.
//!
//! The monitor owns no channel. It decides; the session driver acts:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         now = monitor.wait_for_tick() => match monitor.on_tick(now, channel.is_open()) {
//!             TickAction::SendPing => channel.send(&ping)?,
//!             TickAction::Closed | TickAction::TimedOut { .. } => { /* unexpected close */ }
//!         },
//!         // PONG received:
//!         //     if let Some(rtt) = monitor.on_pong(Instant::now()) { publish(rtt) }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::HeartbeatConfig;

/// What the driver must do after a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Send a `PING` on the current channel.
    SendPing,
    /// The channel was already closed; handle it as an unexpected close.
    Closed,
    /// No pong for longer than the timeout; force-close the channel.
    TimedOut { silent_for: Duration },
}

/// Per-channel heartbeat state.
///
/// Inactive until [`start`](Self::start) is called on channel open; stops
/// itself when it reports `Closed` or `TimedOut`.
#[derive(Debug)]
pub struct LinkMonitor {
    config: HeartbeatConfig,
    next_tick: Option<Instant>,
    last_pong: Option<Instant>,
    last_ping: Option<Instant>,
    last_rtt: Option<Duration>,
}

impl LinkMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config: config.validated(),
            next_tick: None,
            last_pong: None,
            last_ping: None,
            last_rtt: None,
        }
    }

    /// Resets all heartbeat state for a freshly opened channel. The open
    /// itself counts as proof of life.
    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now + self.config.interval);
        self.last_pong = Some(now);
        self.last_ping = None;
        self.last_rtt = None;
        debug!(interval = ?self.config.interval, timeout = ?self.config.timeout, "link monitor started");
    }

    /// Stops ticking. Idempotent.
    pub fn stop(&mut self) {
        self.next_tick = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Decides what a tick at `now` means for the current channel.
    pub fn on_tick(&mut self, now: Instant, channel_open: bool) -> TickAction {
        if !channel_open {
            self.stop();
            return TickAction::Closed;
        }
        let since = self.last_pong.unwrap_or(now);
        let silent_for = now.saturating_duration_since(since);
        if silent_for > self.config.timeout {
            debug!(?silent_for, "heartbeat timeout");
            self.stop();
            return TickAction::TimedOut { silent_for };
        }
        self.last_ping = Some(now);
        trace!("sending ping");
        TickAction::SendPing
    }

    /// Records a pong received at `now`. Returns the round-trip time
    /// measured from the last ping, if one was sent.
    pub fn on_pong(&mut self, now: Instant) -> Option<Duration> {
        self.last_pong = Some(now);
        let rtt = self.last_ping.map(|sent| now.saturating_duration_since(sent));
        if rtt.is_some() {
            self.last_rtt = rtt;
        }
        rtt
    }

    /// Most recent round-trip sample.
    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    /// Waits until the next tick is due and returns its instant.
    ///
    /// While inactive this future pends forever, so it can sit in a
    /// `tokio::select!` unconditionally.
    pub async fn wait_for_tick(&mut self) -> Instant {
        let Some(next) = self.next_tick else {
            return std::future::pending().await;
        };
        time::sleep_until(next).await;
        // Always schedule from the deadline so ticks keep a steady cadence.
        self.next_tick = Some(next + self.config.interval);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> LinkMonitor {
        LinkMonitor::new(HeartbeatConfig::default())
    }

    #[test]
    fn test_monitor_inactive_until_started() {
        let mut m = monitor();
        assert!(!m.is_active());
        m.start(Instant::now());
        assert!(m.is_active());
    }

    #[test]
    fn test_on_tick_closed_channel_stops_monitor() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.start(t0);
        assert_eq!(m.on_tick(t0 + Duration::from_secs(2), false), TickAction::Closed);
        assert!(!m.is_active());
    }

    #[test]
    fn test_on_tick_sends_ping_while_fresh() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.start(t0);
        assert_eq!(m.on_tick(t0 + Duration::from_secs(2), true), TickAction::SendPing);
        assert_eq!(m.on_tick(t0 + Duration::from_secs(4), true), TickAction::SendPing);
    }

    #[test]
    fn test_on_tick_exactly_at_timeout_still_pings() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.start(t0);
        assert_eq!(m.on_tick(t0 + Duration::from_secs(5), true), TickAction::SendPing);
    }

    #[test]
    fn test_on_tick_past_timeout_times_out() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.start(t0);
        let action = m.on_tick(t0 + Duration::from_secs(6), true);
        assert_eq!(
            action,
            TickAction::TimedOut {
                silent_for: Duration::from_secs(6)
            }
        );
        assert!(!m.is_active());
    }

    #[test]
    fn test_on_pong_measures_rtt_from_last_ping() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.start(t0);
        assert_eq!(m.on_pong(t0), None, "no ping sent yet");

        let ping_at = t0 + Duration::from_secs(2);
        m.on_tick(ping_at, true);
        let rtt = m.on_pong(ping_at + Duration::from_millis(40));
        assert_eq!(rtt, Some(Duration::from_millis(40)));
        assert_eq!(m.last_rtt(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_pong_resets_silence_window() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.start(t0);
        m.on_tick(t0 + Duration::from_secs(4), true);
        m.on_pong(t0 + Duration::from_secs(4));
        assert_eq!(m.on_tick(t0 + Duration::from_secs(8), true), TickAction::SendPing);
    }

    #[test]
    fn test_start_clears_previous_rtt() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.start(t0);
        m.on_tick(t0 + Duration::from_secs(2), true);
        m.on_pong(t0 + Duration::from_secs(3));
        m.start(t0 + Duration::from_secs(10));
        assert_eq!(m.last_rtt(), None);
    }
}
