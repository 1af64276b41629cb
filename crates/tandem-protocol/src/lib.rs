//! Wire protocol for Tandem.
//!
//! This crate defines how peers turn messages into bytes:
//!
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages are
//!   converted to/from bytes.
//! - **Frames** ([`KeepAlive`], [`classify`]): link-level keep-alive
//!   traffic and the split between keep-alives and application messages.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the channel (raw bytes) and the session
//! protocols (game moves, record sync). It knows nothing about
//! connections; it only knows how messages look on the wire.
//!
//! ```text
//! Channel (bytes) → classify → KeepAlive | application bytes → SessionProtocol
//! ```

mod codec;
mod error;
mod frame;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{Inbound, KeepAlive, classify, encode_keep_alive};
