//! Stateless verification by exhaustive search
//!
//! The search space is every (key, identifier) pair with identifier in
//! `1..=bound`, walked key-major: all identifiers of key 0, then key 1, and so
//! on. The first pair whose payload equals the input wins. When payloads
//! collide this order decides which pair a code resolves to, so the parallel
//! scan must return exactly what the sequential scan would.
//!
//! Cost is `keys × bound` MAC computations per call. Codes issued for
//! identifiers above `bound` are reported as `NoMatch`, the same as a forged
//! code.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::encoder::{Code, CodeFormatError, HmacSha256Encoder, PayloadEncoder};
use crate::keys::KeyRing;

/// Slots between deadline / cancel checks.
const CHECK_INTERVAL: u64 = 1024;

/// Why a code did not verify. The outcome is invalid in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Text does not start with `LUMOS-`; no search is performed
    MissingPrefix,
    /// Payload is not 8 base32 characters; no search is performed
    MalformedPayload,
    /// The whole key × identifier space up to the bound was scanned
    NoMatch,
    /// Timeout elapsed or the cancel flag was raised mid-scan
    Cancelled,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Rejection::MissingPrefix => "missing LUMOS- prefix",
            Rejection::MalformedPayload => "malformed payload",
            Rejection::NoMatch => "no matching identifier within bound",
            Rejection::Cancelled => "search cancelled",
        };
        f.write_str(reason)
    }
}

impl From<CodeFormatError> for Rejection {
    fn from(e: CodeFormatError) -> Self {
        match e {
            CodeFormatError::MissingPrefix => Rejection::MissingPrefix,
            CodeFormatError::MalformedPayload => Rejection::MalformedPayload,
        }
    }
}

/// Result of verifying one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid { identifier: u64, key_index: usize },
    Invalid(Rejection),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }

    pub fn identifier(&self) -> Option<u64> {
        match self {
            Verdict::Valid { identifier, .. } => Some(*identifier),
            Verdict::Invalid(_) => None,
        }
    }

    pub fn key_index(&self) -> Option<usize> {
        match self {
            Verdict::Valid { key_index, .. } => Some(*key_index),
            Verdict::Invalid(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Verdict::Valid { .. } => None,
            Verdict::Invalid(r) => Some(*r),
        }
    }
}

enum Hit {
    Found { identifier: u64, key_index: usize },
    Interrupted,
}

/// Bounded exhaustive-search verifier over an immutable key ring.
///
/// Holds no mutable state, so one instance can serve many threads.
pub struct Verifier<'r, E = HmacSha256Encoder> {
    encoder: E,
    ring: &'r KeyRing,
    bound: u64,
    timeout: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
    parallel: bool,
}

impl<'r> Verifier<'r, HmacSha256Encoder> {
    pub fn new(ring: &'r KeyRing, bound: u64) -> Self {
        Self::with_encoder(HmacSha256Encoder, ring, bound)
    }
}

impl<'r, E: PayloadEncoder> Verifier<'r, E> {
    /// Sequential verifier with no timeout.
    pub fn with_encoder(encoder: E, ring: &'r KeyRing, bound: u64) -> Self {
        Self {
            encoder,
            ring,
            bound,
            timeout: None,
            cancel: None,
            parallel: false,
        }
    }

    /// Give up after `timeout`; the verdict is then `Invalid(Cancelled)`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop the scan as soon as `flag` becomes true.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Split the scan across the rayon pool. The verdict is unchanged.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn bound(&self) -> u64 {
        self.bound
    }

    pub fn verify(&self, code: &str) -> Verdict {
        let code = match Code::parse(code) {
            Ok(code) => code,
            Err(e) => return Verdict::Invalid(e.into()),
        };

        let deadline = self.timeout.map(|t| Instant::now() + t);
        debug!(
            keys = self.ring.len(),
            bound = self.bound,
            parallel = self.parallel,
            "scanning for code"
        );

        let hit = if self.parallel {
            self.scan_parallel(code.payload(), deadline)
        } else {
            self.scan_sequential(code.payload(), deadline)
        };

        match hit {
            Some(Hit::Found {
                identifier,
                key_index,
            }) => Verdict::Valid {
                identifier,
                key_index,
            },
            Some(Hit::Interrupted) => Verdict::Invalid(Rejection::Cancelled),
            None => Verdict::Invalid(Rejection::NoMatch),
        }
    }

    fn scan_sequential(&self, payload: &str, deadline: Option<Instant>) -> Option<Hit> {
        for (key_index, key) in self.ring.iter() {
            for identifier in 1..=self.bound {
                if identifier % CHECK_INTERVAL == 0 && self.interrupted(deadline) {
                    return Some(Hit::Interrupted);
                }
                if self.encoder.payload(identifier, key).as_str() == payload {
                    return Some(Hit::Found {
                        identifier,
                        key_index,
                    });
                }
            }
        }
        None
    }

    /// Flattened slot `s` is key `s / bound`, identifier `s % bound + 1`, so
    /// slot order is key-major order and `find_map_first` keeps the
    /// sequential answer.
    fn scan_parallel(&self, payload: &str, deadline: Option<Instant>) -> Option<Hit> {
        let bound = self.bound;
        if bound == 0 {
            return None;
        }
        let total = (self.ring.len() as u64).saturating_mul(bound);

        (0..total).into_par_iter().find_map_first(|slot| {
            if slot % CHECK_INTERVAL == 0 && self.interrupted(deadline) {
                return Some(Hit::Interrupted);
            }
            let key_index = (slot / bound) as usize;
            let identifier = slot % bound + 1;
            let key = self.ring.get(key_index)?;
            (self.encoder.payload(identifier, key).as_str() == payload).then_some(Hit::Found {
                identifier,
                key_index,
            })
        })
    }

    fn interrupted(&self, deadline: Option<Instant>) -> bool {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Verify `code` against `ring`, searching identifiers `1..=bound`.
pub fn decode_and_verify(code: &str, ring: &KeyRing, bound: u64) -> Verdict {
    Verifier::new(ring, bound).verify(code)
}
