//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Session protocols never call `serde_json` directly; they go through the
//! [`Codec`] trait, so the wire format can change without touching the
//! game or data-sync logic.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → the codec lives inside a spawned session actor, which
///   Tokio may move between worker threads.
/// - `'static` → the codec owns everything it needs.
///
/// `decode` uses `DeserializeOwned` (rather than `Deserialize<'de>`) so the
/// decoded message never borrows from the channel's receive buffer.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Peers exchange `{"type": "...", ...}` objects, which keeps traffic
/// readable in logs and compatible with peers written against the same
/// message schema in other environments.
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use tandem_protocol::{Codec, JsonCodec, KeepAlive};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&KeepAlive::Ping).unwrap();
/// assert_eq!(bytes, br#"{"type":"PING"}"#);
///
/// let decoded: KeepAlive = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, KeepAlive::Ping);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
