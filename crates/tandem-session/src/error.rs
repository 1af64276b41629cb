//! Error types for the session layer.

use std::time::Duration;

use tandem_link::ReconnectState;
use tandem_transport::TransportError;

use crate::Role;

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Registration with the rendezvous service did not complete in time.
    /// This is a hard failure; it is never retried silently.
    #[error("rendezvous service did not answer within {0:?}")]
    SignalingUnavailable(Duration),

    /// Every freshly generated peer code was already taken.
    #[error("no free peer code after {0} attempts")]
    CollisionRetriesExhausted(u32),

    /// An operation that needs an active session was called without one.
    #[error("no session is registered")]
    NotRegistered,

    /// `host` or `join` was called while a session is already running.
    #[error("a session is already active as {0}")]
    AlreadyActive(Role),

    /// Reconnection gave up; the peer has probably left.
    #[error("peer did not come back after {0} reconnection attempts")]
    PeerGone(u32),

    /// `retry` was called while reconnection had not given up.
    #[error("nothing to retry while {0:?}")]
    NotAbandoned(ReconnectState),

    /// The session ended while waiting.
    #[error("session ended")]
    Ended,

    /// A signaling or channel failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session actor is no longer running.
    #[error("session actor is unavailable")]
    Unavailable,
}
