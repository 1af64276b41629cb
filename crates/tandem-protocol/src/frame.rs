//! Keep-alive frames and inbound frame classification.
//!
//! Every channel carries two kinds of traffic: link-level keep-alive
//! frames (`{"type":"PING"}` / `{"type":"PONG"}`) and application
//! messages. The session driver classifies each inbound frame first, so
//! keep-alives are answered before any application decoding and never
//! reach a session protocol.

use serde::{Deserialize, Serialize};

use crate::{Codec, ProtocolError};

/// Link-level liveness frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum KeepAlive {
    Ping,
    Pong,
}

/// An inbound frame after classification.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound<'a> {
    KeepAlive(KeepAlive),
    /// Anything else; left undecoded for the session protocol.
    Application(&'a [u8]),
}

/// Classifies raw bytes received on a channel.
pub fn classify<'a, C: Codec>(codec: &C, data: &'a [u8]) -> Inbound<'a> {
    match codec.decode::<KeepAlive>(data) {
        Ok(frame) => Inbound::KeepAlive(frame),
        Err(_) => Inbound::Application(data),
    }
}

/// Encodes a keep-alive frame.
pub fn encode_keep_alive<C: Codec>(codec: &C, frame: KeepAlive) -> Result<Vec<u8>, ProtocolError> {
    codec.encode(&frame)
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::JsonCodec;

    #[test]
    fn test_keep_alive_wire_format() {
        assert_eq!(
            encode_keep_alive(&JsonCodec, KeepAlive::Ping).unwrap(),
            br#"{"type":"PING"}"#
        );
        assert_eq!(
            encode_keep_alive(&JsonCodec, KeepAlive::Pong).unwrap(),
            br#"{"type":"PONG"}"#
        );
    }

    #[test]
    fn test_classify_ping_and_pong() {
        assert_eq!(
            classify(&JsonCodec, br#"{"type":"PING"}"#),
            Inbound::KeepAlive(KeepAlive::Ping)
        );
        assert_eq!(
            classify(&JsonCodec, br#"{"type":"PONG"}"#),
            Inbound::KeepAlive(KeepAlive::Pong)
        );
    }

    #[test]
    fn test_classify_application_message_passes_through() {
        let raw = br#"{"type":"MOVE","column":3,"player":"One","turn":1}"#;
        assert_eq!(classify(&JsonCodec, raw), Inbound::Application(raw));
    }

    #[test]
    fn test_classify_garbage_is_application() {
        // Undecodable bytes are the protocol's problem, not the link's.
        assert_eq!(classify(&JsonCodec, b"\x00\x01"), Inbound::Application(b"\x00\x01"));
    }
}
