//! PIN-exchange wire format.
//!
//! The protocol is two ASCII datagrams with no framing, versioning, or
//! checksum beyond UDP's own:
//!
//! ```text
//! guest ──► broadcast   "WHO_HAS_PIN 482910"
//! host  ──► guest       "I_HAVE_PIN Living Room PC"
//! ```
//!
//! The responder's *packet source address* identifies the host; the name in
//! the payload is informational only.  Nothing here authenticates the
//! responder: any LAN peer can answer for any PIN.

use thiserror::Error;

/// Number of characters in a PIN.
pub const PIN_LENGTH: usize = 6;

const REQUEST_PREFIX: &str = "WHO_HAS_PIN ";
const RESPONSE_PREFIX: &str = "I_HAVE_PIN ";

/// Errors produced while validating a user-supplied PIN.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must be exactly {PIN_LENGTH} characters, got {0}")]
    WrongLength(usize),
    #[error("PIN must contain only decimal digits")]
    NotNumeric,
}

/// A validated six-digit PIN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinToken(String);

impl PinToken {
    /// Validates `raw` as a PIN.  No trimming is applied.
    ///
    /// # Errors
    ///
    /// [`PinError::WrongLength`] unless `raw` has exactly six characters,
    /// [`PinError::NotNumeric`] if any character is not an ASCII digit.
    pub fn parse(raw: &str) -> Result<Self, PinError> {
        let len = raw.chars().count();
        if len != PIN_LENGTH {
            return Err(PinError::WrongLength(len));
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PinError::NotNumeric);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PinToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One PIN-exchange datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinMessage {
    /// Request: "which host holds this PIN?"
    WhoHasPin(String),
    /// Response carrying the responder's display name.
    IHavePin(String),
}

impl PinMessage {
    /// Builds the request datagram for `pin`.
    pub fn request(pin: &PinToken) -> Self {
        PinMessage::WhoHasPin(pin.as_str().to_string())
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            PinMessage::WhoHasPin(pin) => format!("{REQUEST_PREFIX}{pin}").into_bytes(),
            PinMessage::IHavePin(name) => format!("{RESPONSE_PREFIX}{name}").into_bytes(),
        }
    }

    /// Decodes a datagram.  Anything that is not UTF-8 or does not start with
    /// one of the two exact prefixes is foreign traffic and yields `None`.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        if let Some(pin) = text.strip_prefix(REQUEST_PREFIX) {
            return Some(PinMessage::WhoHasPin(pin.to_string()));
        }
        text.strip_prefix(RESPONSE_PREFIX)
            .map(|name| PinMessage::IHavePin(name.to_string()))
    }

    /// Returns `true` when `payload` is byte-for-byte the request for `pin`.
    pub fn is_request_for(payload: &[u8], pin: &PinToken) -> bool {
        payload == Self::request(pin).encode().as_slice()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_six_digits() {
        let pin = PinToken::parse("123456").unwrap();
        assert_eq!(pin.as_str(), "123456");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(PinToken::parse("12345"), Err(PinError::WrongLength(5)));
        assert_eq!(PinToken::parse("1234567"), Err(PinError::WrongLength(7)));
        assert_eq!(PinToken::parse(""), Err(PinError::WrongLength(0)));
    }

    #[test]
    fn test_parse_rejects_non_digits() {
        assert_eq!(PinToken::parse("12a456"), Err(PinError::NotNumeric));
        assert_eq!(PinToken::parse(" 12345"), Err(PinError::NotNumeric));
    }

    #[test]
    fn test_request_encoding_is_exact_ascii() {
        let pin = PinToken::parse("000042").unwrap();
        assert_eq!(PinMessage::request(&pin).encode(), b"WHO_HAS_PIN 000042");
    }

    #[test]
    fn test_decode_response_keeps_name_with_spaces() {
        let msg = PinMessage::decode(b"I_HAVE_PIN Living Room PC");
        assert_eq!(msg, Some(PinMessage::IHavePin("Living Room PC".into())));
    }

    #[test]
    fn test_decode_discards_foreign_traffic() {
        assert_eq!(PinMessage::decode(b"HELLO"), None);
        assert_eq!(PinMessage::decode(b"i_have_pin lowercase"), None);
        assert_eq!(PinMessage::decode(&[0xff, 0xfe, 0x00]), None);
        // The prefix includes the separating space.
        assert_eq!(PinMessage::decode(b"I_HAVE_PIN"), None);
    }

    #[test]
    fn test_is_request_for_requires_exact_match() {
        let pin = PinToken::parse("123456").unwrap();
        assert!(PinMessage::is_request_for(b"WHO_HAS_PIN 123456", &pin));
        assert!(!PinMessage::is_request_for(b"WHO_HAS_PIN 123456\n", &pin));
        assert!(!PinMessage::is_request_for(b"WHO_HAS_PIN 654321", &pin));
    }
}
