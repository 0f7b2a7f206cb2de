//! Precomputed payload → (identifier, key index) table
//!
//! Trades `keys × bound` entries of memory for O(1) lookups. Entries are
//! inserted in verifier scan order and the first occurrence of a payload is
//! kept, so lookups agree with [`Verifier`](crate::Verifier) on collisions.

use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::encoder::{Code, Payload, PayloadEncoder};
use crate::keys::KeyRing;
use crate::verifier::{Rejection, Verdict};

/// Entries reserved up front; larger tables grow on demand.
const PREALLOC_LIMIT: u64 = 1 << 20;

/// A payload produced by more than one (identifier, key index) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCollision {
    pub payload: Payload,
    /// Pair the payload resolves to
    pub kept: (u64, usize),
    /// Later pair in scan order that can never be resolved
    pub shadowed: (u64, usize),
}

fn initial_capacity(keys: usize, bound: u64) -> usize {
    (keys as u64).saturating_mul(bound).min(PREALLOC_LIMIT) as usize
}

#[derive(Debug, Default)]
pub struct ReverseIndex {
    entries: HashMap<Payload, (u64, usize)>,
    collisions: Vec<IndexCollision>,
    bound: u64,
}

impl ReverseIndex {
    pub fn build<E: PayloadEncoder>(encoder: &E, ring: &KeyRing, bound: u64) -> Self {
        let mut index = ReverseIndex {
            entries: HashMap::with_capacity(initial_capacity(ring.len(), bound)),
            collisions: Vec::new(),
            bound,
        };

        for (key_index, key) in ring.iter() {
            let payloads: Vec<Payload> = (1..=bound)
                .into_par_iter()
                .map(|identifier| encoder.payload(identifier, key))
                .collect();

            for (identifier, payload) in (1..=bound).zip(payloads) {
                match index.entries.entry(payload) {
                    Entry::Vacant(slot) => {
                        slot.insert((identifier, key_index));
                    }
                    Entry::Occupied(slot) => {
                        index.collisions.push(IndexCollision {
                            payload: slot.key().clone(),
                            kept: *slot.get(),
                            shadowed: (identifier, key_index),
                        });
                    }
                }
            }
        }

        if !index.collisions.is_empty() {
            warn!(
                collisions = index.collisions.len(),
                "reverse index has shadowed (identifier, key) pairs"
            );
        }
        info!(entries = index.entries.len(), bound, "reverse index built");
        index
    }

    /// Same verdict `Verifier::verify` returns for `code` at this bound.
    pub fn lookup(&self, code: &str) -> Verdict {
        let code = match Code::parse(code) {
            Ok(code) => code,
            Err(e) => return Verdict::Invalid(e.into()),
        };
        let payload = match Payload::parse(code.payload()) {
            Ok(p) => p,
            Err(e) => return Verdict::Invalid(e.into()),
        };
        match self.entries.get(&payload) {
            Some(&(identifier, key_index)) => Verdict::Valid {
                identifier,
                key_index,
            },
            None => Verdict::Invalid(Rejection::NoMatch),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bound(&self) -> u64 {
        self.bound
    }

    pub fn collisions(&self) -> &[IndexCollision] {
        &self.collisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode, HmacSha256Encoder};
    use crate::keys::MasterKey;
    use crate::verifier::Verifier;

    /// Payload depends on `identifier % 4` only.
    struct FourWay;

    impl PayloadEncoder for FourWay {
        fn payload(&self, identifier: u64, _key: &MasterKey) -> Payload {
            let last = [b'A', b'B', b'C', b'D'][(identifier % 4) as usize] as char;
            Payload::parse(&format!("AAAAAAA{last}")).unwrap()
        }
    }

    #[test]
    fn test_lookup_matches_verifier() {
        let ring = KeyRing::builtin();
        let index = ReverseIndex::build(&HmacSha256Encoder, &ring, 300);
        let verifier = Verifier::new(&ring, 300);

        for (identifier, key_index) in [(1u64, 1usize), (300, 0), (150, 4)] {
            let code = encode(identifier, ring.get(key_index).unwrap());
            assert_eq!(index.lookup(code.as_str()), verifier.verify(code.as_str()));
            assert_eq!(
                index.lookup(code.as_str()),
                Verdict::Valid {
                    identifier,
                    key_index
                }
            );
        }
        assert_eq!(index.len(), 1500 - index.collisions().len());
    }

    #[test]
    fn test_collisions_keep_first_in_scan_order() {
        let ring = KeyRing::from_strs(["a", "b"]).unwrap();
        let index = ReverseIndex::build(&FourWay, &ring, 8);

        assert_eq!(index.len(), 4);
        // 16 pairs, 4 distinct payloads.
        assert_eq!(index.collisions().len(), 12);
        assert_eq!(
            index.lookup("LUMOS-AAAAAAAD"),
            Verdict::Valid {
                identifier: 3,
                key_index: 0
            }
        );
        assert_eq!(
            index.lookup("LUMOS-AAAAAAAA"),
            Verdict::Valid {
                identifier: 4,
                key_index: 0
            }
        );

        let verifier = Verifier::with_encoder(FourWay, &ring, 8);
        for code in ["LUMOS-AAAAAAAA", "LUMOS-AAAAAAAB", "LUMOS-AAAAAAAC", "LUMOS-AAAAAAAD"] {
            assert_eq!(index.lookup(code), verifier.verify(code));
        }
    }

    #[test]
    fn test_initial_capacity_is_capped() {
        assert_eq!(initial_capacity(5, 300), 1500);
        assert_eq!(initial_capacity(5, u64::MAX), PREALLOC_LIMIT as usize);
        assert_eq!(initial_capacity(usize::MAX, 2), PREALLOC_LIMIT as usize);
    }

    #[test]
    fn test_lookup_rejections() {
        let ring = KeyRing::builtin();
        let index = ReverseIndex::build(&FourWay, &ring, 4);

        assert_eq!(
            index.lookup("NOT-A-CODE"),
            Verdict::Invalid(Rejection::MissingPrefix)
        );
        assert_eq!(
            index.lookup("LUMOS-AAAA1111"),
            Verdict::Invalid(Rejection::MalformedPayload)
        );
        assert_eq!(
            index.lookup("LUMOS-ZZZZZZZZ"),
            Verdict::Invalid(Rejection::NoMatch)
        );
    }
}
