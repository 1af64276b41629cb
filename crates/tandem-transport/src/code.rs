//! Human-shareable peer codes.
//!
//! A peer code is what one person reads aloud (or pastes) to the other:
//! six characters from `[0-9A-Z]`. The space is ~2.2 billion codes, which
//! is plenty for casual two-party sessions as long as a collision reported
//! by the rendezvous service is answered with a fresh code.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::TransportError;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A 6-character uppercase alphanumeric identity on the rendezvous service.
///
/// Serializes as a plain string; deserialization runs the same validation
/// as [`PeerCode::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerCode(String);

impl PeerCode {
    /// Number of characters in every code.
    pub const LEN: usize = 6;

    /// Generates a random code.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..Self::LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parses user input. Surrounding whitespace is trimmed and lowercase
    /// letters are accepted, since codes are typed by hand.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let code = input.trim().to_ascii_uppercase();
        let valid = code.len() == Self::LEN
            && code.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());
        if !valid {
            return Err(TransportError::InvalidCode(input.to_string()));
        }
        Ok(Self(code))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PeerCode {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PeerCode> for String {
    fn from(code: PeerCode) -> Self {
        code.0
    }
}

impl FromStr for PeerCode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PeerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
