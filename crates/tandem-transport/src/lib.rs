//! Rendezvous signaling and peer channels for Tandem.
//!
//! Two people who want to share a session each hold a [`Signaling`]
//! endpoint. One of them registers a short [`PeerCode`] and reads it out;
//! the other dials that code and both sides receive a [`Channel`] that
//! carries opaque byte messages in FIFO order.
//!
//! Everything above this crate sees only [`Signaling`], [`Channel`] and
//! [`ChannelEvent`], so the session layer runs unchanged over the
//! in-process [`MemoryHub`] or over a WebSocket relay.
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`RelayServer`] and [`WebSocketSignaling`]
//!   via `tokio-tungstenite`

mod channel;
mod code;
mod error;
mod memory;
#[cfg(feature = "websocket")]
mod relay;
#[cfg(feature = "websocket")]
mod websocket;

pub use channel::{Channel, ChannelErrorKind, ChannelEvent, ChannelId};
pub use code::PeerCode;
pub use error::TransportError;
pub use memory::{MemoryHub, MemorySignaling};
#[cfg(feature = "websocket")]
pub use relay::{RelayFrame, RelayServer};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketSignaling;

use std::future::Future;

/// A connection to a rendezvous service.
///
/// The futures are `Send` so a session actor that owns the endpoint can be
/// spawned onto a multi-threaded runtime.
pub trait Signaling: Send + 'static {
    /// Claims `code` as this endpoint's discoverable identity.
    ///
    /// Fails with [`TransportError::Collision`] when the code is taken, in
    /// which case the caller should generate a fresh one. Registering again
    /// releases the previous code.
    fn register(
        &mut self,
        code: &PeerCode,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Dials `remote`. Returns a pending channel immediately; success is
    /// reported by [`ChannelEvent::Open`], failure by
    /// [`ChannelEvent::Error`] followed by [`ChannelEvent::Close`].
    fn connect(
        &mut self,
        remote: &PeerCode,
    ) -> impl Future<Output = Result<Channel, TransportError>> + Send;

    /// Waits for the next inbound channel. `None` means the endpoint can no
    /// longer receive connections.
    fn accept(&mut self) -> impl Future<Output = Option<Channel>> + Send;

    /// Deregisters and closes every channel created by this endpoint. The
    /// endpoint may register again afterwards.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;

    /// The currently registered code, if any.
    fn local_code(&self) -> Option<&PeerCode>;
}
