//! Batch generation: the only operation that extends the registry.
//!
//! Identifiers continue from `registry.next_identifier()`. The key for each
//! identifier is `identifier mod ring.len()`, so assignment depends on the
//! identifier alone.

use lumos_core::config::CollisionPolicy;
use lumos_core::{CodeRecord, LumosError, LumosResult};
use std::collections::HashMap;
use std::ops::{Range, RangeInclusive};
use tracing::{info, warn};

use crate::encoder::{encode_with, HmacSha256Encoder, PayloadEncoder};
use crate::keys::KeyRing;
use crate::registry::Registry;

/// Largest batch one run may issue. The registry is rewritten whole.
pub const MAX_BATCH_SIZE: u64 = 1_000_000;

/// A new code whose text was already issued for another identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub code: String,
    /// Identifier that first received the code
    pub existing: u64,
    /// Identifier in this batch that repeats it
    pub new: u64,
}

/// Output of one generation run.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Records created by this run, in identifier order
    pub records: Vec<CodeRecord>,
    /// Previous records followed by `records`
    pub registry: Registry,
    pub collisions: Vec<Collision>,
}

impl Batch {
    pub fn identifiers(&self) -> Option<RangeInclusive<u64>> {
        let first = self.records.first()?.identifier;
        let last = self.records.last()?.identifier;
        Some(first..=last)
    }

    /// Apply the configured collision policy.
    pub fn check_collisions(&self, policy: CollisionPolicy) -> LumosResult<()> {
        if self.collisions.is_empty() {
            return Ok(());
        }
        for c in &self.collisions {
            warn!(
                code = %c.code,
                existing = c.existing,
                new = c.new,
                "code collision; verification resolves to the earlier pair in scan order"
            );
        }
        match policy {
            CollisionPolicy::Warn => Ok(()),
            CollisionPolicy::Fail => Err(LumosError::Collision(format!(
                "{} new code(s) repeat an issued code, first: {} (#{} and #{})",
                self.collisions.len(),
                self.collisions[0].code,
                self.collisions[0].existing,
                self.collisions[0].new
            ))),
        }
    }
}

/// Identifiers the next batch of `count` codes will receive.
pub fn planned_identifiers(registry: &Registry, count: u64) -> LumosResult<Range<u64>> {
    if count > MAX_BATCH_SIZE {
        return Err(LumosError::BatchTooLarge {
            count,
            max: MAX_BATCH_SIZE,
        });
    }
    let first = registry.next_identifier()?;
    let end = first.checked_add(count).ok_or_else(|| {
        LumosError::IdentifierOverflow(format!("{count} codes after #{first} exceed u64"))
    })?;
    Ok(first..end)
}

/// Issue `count` codes with the production encoder.
pub fn generate_batch(count: u64, registry: Registry, ring: &KeyRing) -> LumosResult<Batch> {
    generate_batch_with(&HmacSha256Encoder, count, registry, ring)
}

pub fn generate_batch_with<E: PayloadEncoder>(
    encoder: &E,
    count: u64,
    mut registry: Registry,
    ring: &KeyRing,
) -> LumosResult<Batch> {
    let identifiers = planned_identifiers(&registry, count)?;
    let next_id = identifiers.start;

    let mut seen: HashMap<String, u64> = registry
        .records()
        .iter()
        .map(|r| (r.code.clone(), r.identifier))
        .collect();

    let mut records = Vec::with_capacity(count as usize);
    let mut collisions = Vec::new();

    for identifier in identifiers {
        let key_index = ring.key_index_for(identifier);
        let Some(key) = ring.get(key_index) else {
            continue;
        };
        let code = encode_with(encoder, identifier, key).into_string();

        if let Some(&existing) = seen.get(&code) {
            collisions.push(Collision {
                code: code.clone(),
                existing,
                new: identifier,
            });
        } else {
            seen.insert(code.clone(), identifier);
        }

        records.push(CodeRecord {
            identifier,
            code,
            key_index,
        });
    }

    registry.append(records.iter().cloned());
    info!(
        new = records.len(),
        total = registry.len(),
        first = next_id,
        collisions = collisions.len(),
        "generated batch"
    );

    Ok(Batch {
        records,
        registry,
        collisions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Payload;
    use crate::keys::MasterKey;

    /// Every identifier maps to one of two payloads.
    struct TwoCodes;

    impl PayloadEncoder for TwoCodes {
        fn payload(&self, identifier: u64, _key: &MasterKey) -> Payload {
            let text = if identifier % 2 == 0 { "AAAAAAAA" } else { "BBBBBBBB" };
            Payload::parse(text).unwrap()
        }
    }

    #[test]
    fn test_first_batch_starts_at_one() {
        let ring = KeyRing::builtin();
        let batch = generate_batch(100, Registry::new(), &ring).unwrap();

        assert_eq!(batch.records.len(), 100);
        assert_eq!(batch.identifiers(), Some(1..=100));
        assert_eq!(batch.registry.len(), 100);
        assert!(batch.collisions.is_empty());
    }

    #[test]
    fn test_key_index_follows_identifier() {
        let ring = KeyRing::builtin();
        let batch = generate_batch(12, Registry::new(), &ring).unwrap();

        for record in &batch.records {
            assert_eq!(record.key_index, (record.identifier % 5) as usize);
        }
    }

    #[test]
    fn test_zero_count_leaves_registry_unchanged() {
        let ring = KeyRing::builtin();
        let first = generate_batch(3, Registry::new(), &ring).unwrap();
        let batch = generate_batch(0, first.registry.clone(), &ring).unwrap();

        assert!(batch.records.is_empty());
        assert_eq!(batch.identifiers(), None);
        assert_eq!(batch.registry, first.registry);
    }

    #[test]
    fn test_collisions_detected_across_registry_and_batch() {
        let ring = KeyRing::builtin();
        let first = generate_batch_with(&TwoCodes, 2, Registry::new(), &ring).unwrap();
        assert!(first.collisions.is_empty());

        let second = generate_batch_with(&TwoCodes, 3, first.registry, &ring).unwrap();

        assert_eq!(second.collisions.len(), 3);
        assert_eq!(
            second.collisions[0],
            Collision {
                code: "LUMOS-BBBBBBBB".into(),
                existing: 1,
                new: 3
            }
        );
        // Colliding codes are still issued.
        assert_eq!(second.registry.len(), 5);
    }

    #[test]
    fn test_oversized_batch_is_rejected() {
        let ring = KeyRing::builtin();
        let err = generate_batch(u64::MAX, Registry::new(), &ring).unwrap_err();
        assert!(matches!(
            err,
            LumosError::BatchTooLarge {
                count: u64::MAX,
                max: MAX_BATCH_SIZE
            }
        ));
    }

    #[test]
    fn test_identifier_overflow_is_rejected() {
        let ring = KeyRing::builtin();
        let registry = Registry::from_records(vec![CodeRecord {
            identifier: u64::MAX - 2,
            code: "LUMOS-AAAAAAAA".into(),
            key_index: 0,
        }]);

        assert_eq!(
            planned_identifiers(&registry, 1).unwrap(),
            u64::MAX - 1..u64::MAX
        );
        let err = generate_batch(2, registry, &ring).unwrap_err();
        assert!(matches!(err, LumosError::IdentifierOverflow(_)));
    }

    #[test]
    fn test_collision_policy() {
        let ring = KeyRing::builtin();
        let batch = generate_batch_with(&TwoCodes, 4, Registry::new(), &ring).unwrap();
        assert_eq!(batch.collisions.len(), 2);

        assert!(batch.check_collisions(CollisionPolicy::Warn).is_ok());
        let err = batch.check_collisions(CollisionPolicy::Fail).unwrap_err();
        assert!(matches!(err, LumosError::Collision(_)));
    }
}
