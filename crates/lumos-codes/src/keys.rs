//! Master keys and the ordered key ring

use anyhow::Context;
use lumos_core::{LumosError, LumosResult};
use std::path::Path;
use zeroize::Zeroize;

/// Keys of the built-in ring, in index order.
pub const BUILTIN_KEYS: [&str; 5] = [
    "LUMOS_MASTER_KEY_ALPHA",
    "LUMOS_MASTER_KEY_BETA",
    "LUMOS_MASTER_KEY_GAMMA",
    "LUMOS_MASTER_KEY_DELTA",
    "LUMOS_MASTER_KEY_EPSILON",
];

/// A master key: an opaque, non-empty secret byte string.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey {
    bytes: Vec<u8>,
}

impl MasterKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> LumosResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(LumosError::KeyRing("master key must not be empty".into()));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Ordered, immutable set of master keys. Keys are addressed by 0-based index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRing {
    keys: Vec<MasterKey>,
}

impl KeyRing {
    /// Build a ring from keys in index order. An empty ring is rejected.
    pub fn new(keys: Vec<MasterKey>) -> LumosResult<Self> {
        if keys.is_empty() {
            return Err(LumosError::KeyRing("key ring must hold at least one key".into()));
        }
        Ok(Self { keys })
    }

    pub fn from_strs<I, S>(keys: I) -> LumosResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|k| MasterKey::new(k.as_ref().as_bytes()))
            .collect::<LumosResult<Vec<_>>>()?;
        Self::new(keys)
    }

    /// The five-key ring codes are issued with by default.
    pub fn builtin() -> Self {
        Self {
            keys: BUILTIN_KEYS
                .iter()
                .map(|k| MasterKey {
                    bytes: k.as_bytes().to_vec(),
                })
                .collect(),
        }
    }

    /// Load a ring from a JSON array of key strings.
    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading key file: {}", path.display()))?;
        let mut keys: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("parsing key file: {}", path.display()))?;
        let ring = Self::from_strs(&keys)
            .with_context(|| format!("building key ring from {}", path.display()))?;
        keys.zeroize();
        Ok(ring)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MasterKey> {
        self.keys.get(index)
    }

    /// Keys with their indices, in ring order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &MasterKey)> {
        self.keys.iter().enumerate()
    }

    /// Key index assigned to an identifier: `identifier mod len`.
    pub fn key_index_for(&self, identifier: u64) -> usize {
        (identifier % self.keys.len() as u64) as usize
    }
}
