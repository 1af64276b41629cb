//! Link liveness and reconnection for Tandem.
//!
//! Two small state machines that wrap every peer channel:
//!
//! - [`LinkMonitor`]: heartbeat pings, pong bookkeeping, RTT samples and
//!   the "silent for too long" verdict.
//! - [`ReconnectController`]: bounded exponential backoff for the dialing
//!   side, with an explicit give-up state.
//!
//! Both are pure: they take instants and events and return decisions. The
//! only async piece is [`LinkMonitor::wait_for_tick`], designed to sit in
//! a session actor's `tokio::select!` loop.

mod config;
mod monitor;
mod reconnect;

pub use config::{HeartbeatConfig, ReconnectConfig};
pub use monitor::{LinkMonitor, TickAction};
pub use reconnect::{Directive, ReconnectController, ReconnectEvent, ReconnectState};
