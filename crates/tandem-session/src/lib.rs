//! Session driver for Tandem.
//!
//! One reusable actor runs every kind of peer session. It is generic over
//! a [`SessionProtocol`] (the message schema plus a reducer) and takes
//! care of everything the protocols should not have to think about:
//!
//! - registering a [`PeerCode`](tandem_transport::PeerCode) (with fresh
//!   codes on collision and a hard timeout),
//! - dialing, accepting and replacing the single current channel,
//! - heartbeats and RTT samples ([`tandem_link::LinkMonitor`]),
//! - reconnection with backoff ([`tandem_link::ReconnectController`]),
//! - event fan-out to token-based subscribers.
//!
//! # Lifecycle
//!
//! ```text
//! spawn_session ──→ host() / join(code) ──→ [connected ⇄ reconnecting] ──→ end()
//!                                                   │
//!                                                   └──→ Abandoned ──retry()──┐
//!                                                            ↑                │
//!                                                            └────────────────┘
//! ```

mod actor;
mod config;
mod error;
mod event;
mod handle;
mod protocol;

pub use actor::spawn_session;
pub use config::SessionConfig;
pub use error::SessionError;
pub use event::{SessionEvent, SessionStatus};
pub use handle::{SessionHandle, Subscription, SubscriptionId};
pub use protocol::{Outbox, Role, SessionProtocol};
