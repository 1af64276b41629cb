//! Events published by a session actor.

use std::time::Duration;

use tandem_link::ReconnectState;
use tandem_transport::PeerCode;

use crate::Role;

/// Everything a subscriber can observe about a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent<E> {
    /// The endpoint registered and the session started.
    Registered { code: PeerCode, role: Role },
    /// A channel to `remote` opened.
    Connected { remote: PeerCode },
    /// The open channel was lost (closed, faulted, or heartbeat timeout).
    Disconnected,
    /// A round-trip sample from the heartbeat. Display only.
    Latency(Duration),
    /// A reconnection attempt is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnection gave up after `attempts` tries.
    Abandoned { attempts: u32 },
    /// The session was ended locally.
    Ended,
    /// An application event from the session protocol.
    Protocol(E),
}

/// A point-in-time snapshot of the session actor.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub role: Option<Role>,
    pub code: Option<PeerCode>,
    pub remote: Option<PeerCode>,
    pub connected: bool,
    pub reconnect: ReconnectState,
    pub rtt: Option<Duration>,
}
