//! lumos-codes: keyed redemption codes that verify without a lookup table
//!
//! A code is a pure function of an identifier and one key from a small ring:
//!
//! ```text
//! message = "USER_{identifier:06}_LUMOS"
//! tag     = HMAC-SHA256(key, message)
//! payload = base32_nopad(tag[..6])[..8]
//! code    = "LUMOS-" || payload
//! ```
//!
//! Verification walks the key × identifier space (key index ascending, then
//! identifier ascending) up to a fixed bound and reports the first match.
//! Identifiers above the bound are never found: such codes verify as invalid.
//!
//! The registry is the only persisted state. It is loaded whole, extended by a
//! batch, and rewritten whole via temp file + rename.

mod atomic;
pub mod batch;
pub mod encoder;
pub mod index;
pub mod keys;
pub mod publish;
pub mod registry;
pub mod verifier;

pub use batch::{
    generate_batch, generate_batch_with, planned_identifiers, Batch, Collision, MAX_BATCH_SIZE,
};
pub use encoder::{
    encode, encode_with, Code, CodeFormatError, HmacSha256Encoder, Payload, PayloadEncoder,
};
pub use index::{IndexCollision, ReverseIndex};
pub use keys::{KeyRing, MasterKey};
pub use publish::{publish, render_typescript, write_artifact, KeyIndexEntry, KeyIndexTable};
pub use registry::{backup_unreadable, LoadOutcome, Registry};
pub use verifier::{decode_and_verify, Rejection, Verdict, Verifier};

/// Literal prefix of every code, separator included
pub const CODE_PREFIX: &str = "LUMOS-";

/// Number of base32 characters after the prefix
pub const PAYLOAD_LEN: usize = 8;

/// Number of leading MAC bytes fed to the base32 encoder
pub const MAC_BYTES: usize = 6;
