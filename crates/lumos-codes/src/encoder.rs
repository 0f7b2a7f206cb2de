//! Code encoding: (identifier, key) → `LUMOS-XXXXXXXX`
//!
//! The encoder is deterministic and stateless. It does not detect collisions:
//! only 40 bits of the 256-bit tag survive truncation, so distinct
//! (identifier, key) pairs can share a payload.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::MasterKey;
use crate::{CODE_PREFIX, MAC_BYTES, PAYLOAD_LEN};

/// The 8-character base32 part of a code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Payload(String);

impl Payload {
    /// Accepts exactly `PAYLOAD_LEN` characters from the RFC 4648 alphabet (`A-Z`, `2-7`).
    pub fn parse(text: &str) -> Result<Self, CodeFormatError> {
        let well_formed = text.len() == PAYLOAD_LEN
            && text
                .bytes()
                .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b));
        if well_formed {
            Ok(Self(text.to_owned()))
        } else {
            Err(CodeFormatError::MalformedPayload)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a string is not shaped like a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodeFormatError {
    #[error("missing \"LUMOS-\" prefix")]
    MissingPrefix,
    #[error("payload is not 8 base32 characters")]
    MalformedPayload,
}

/// A full code: prefix followed by payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code {
    text: String,
}

impl Code {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            text: format!("{CODE_PREFIX}{payload}"),
        }
    }

    /// Parse code text. The prefix is checked first, then the payload shape.
    pub fn parse(text: &str) -> Result<Self, CodeFormatError> {
        let rest = text
            .strip_prefix(CODE_PREFIX)
            .ok_or(CodeFormatError::MissingPrefix)?;
        let payload = Payload::parse(rest)?;
        Ok(Self::from_payload(&payload))
    }

    pub fn payload(&self) -> &str {
        &self.text[CODE_PREFIX.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Maps (identifier, key) to a payload.
///
/// The verifier and the batch generator are generic over this so tests can
/// substitute a reduced output space.
pub trait PayloadEncoder: Send + Sync {
    fn payload(&self, identifier: u64, key: &MasterKey) -> Payload;
}

/// HMAC-SHA256 over `USER_{identifier:06}_LUMOS`, truncated to 8 base32 characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Encoder;

impl HmacSha256Encoder {
    /// Message bound into the MAC. Identifiers wider than six digits are not
    /// truncated, they just lengthen the message.
    pub fn message(identifier: u64) -> String {
        format!("USER_{identifier:06}_LUMOS")
    }
}

impl PayloadEncoder for HmacSha256Encoder {
    fn payload(&self, identifier: u64, key: &MasterKey) -> Payload {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(Self::message(identifier).as_bytes());
        let tag = mac.finalize().into_bytes();

        let mut encoded = BASE32_NOPAD.encode(&tag[..MAC_BYTES]);
        encoded.truncate(PAYLOAD_LEN);
        Payload(encoded)
    }
}

/// Encode with the production HMAC-SHA256 scheme.
pub fn encode(identifier: u64, key: &MasterKey) -> Code {
    encode_with(&HmacSha256Encoder, identifier, key)
}

pub fn encode_with<E: PayloadEncoder + ?Sized>(encoder: &E, identifier: u64, key: &MasterKey) -> Code {
    Code::from_payload(&encoder.payload(identifier, key))
}
