use crate::PeerCode;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The rendezvous service already has an endpoint under this code.
    #[error("peer code {0} is already registered")]
    Collision(PeerCode),

    /// `connect` was called before the endpoint registered an identity.
    #[error("endpoint has not registered with the rendezvous service")]
    NotRegistered,

    /// The rendezvous service could not be reached or dropped us.
    #[error("signaling network failure: {0}")]
    Network(String),

    /// The channel is not open.
    #[error("channel closed: {0}")]
    ConnectionClosed(String),

    /// A peer code failed validation.
    #[error("invalid peer code {0:?}")]
    InvalidCode(String),

    /// Binding or accepting relay connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The signaling endpoint was shut down.
    #[error("signaling endpoint shut down")]
    Shutdown,
}
