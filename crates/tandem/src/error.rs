//! Unified error type for Tandem.

use tandem_budget::{BudgetError, StoreError};
use tandem_game::GameError;
use tandem_protocol::ProtocolError;
use tandem_session::SessionError;
use tandem_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tandem` facade you deal with this single error type
/// instead of importing errors from each sub-crate; `?` converts them.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    /// Signaling or channel failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding a wire message failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Registration, lifecycle or reconnection failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A game action was refused.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A budget action was refused.
    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TandemError {
    /// True when the rendezvous service could not be reached or the peer
    /// is gone, the two cases a user has to act on.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            TandemError::Transport(_)
                | TandemError::Session(
                    SessionError::SignalingUnavailable(_)
                        | SessionError::PeerGone(_)
                        | SessionError::Transport(_)
                )
        )
    }
}
