//! Public key-index table: SHA-256 of a per-key label → key index
//!
//! The label is `MASTER_KEY_{index}_` followed by the key bytes. It is unrelated
//! to the message the encoder MACs, so the table reveals nothing about codes.
//!
//! The raw keys are left out of the rendered artifact unless the caller asks
//! for them: shipping them next to the table would defeat its purpose.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::atomic::atomic_write;
use crate::keys::{KeyRing, MasterKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIndexEntry {
    /// Lowercase hex SHA-256 of the key's label
    pub hash: String,
    pub key_index: usize,
}

/// One entry per ring member, in key index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIndexTable {
    entries: Vec<KeyIndexEntry>,
}

impl KeyIndexTable {
    pub fn entries(&self) -> &[KeyIndexEntry] {
        &self.entries
    }

    /// Key index whose label hashes to `hash` (hex, case-insensitive).
    pub fn resolve(&self, hash: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.hash.eq_ignore_ascii_case(hash))
            .map(|e| e.key_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn label(index: usize, key: &MasterKey) -> Vec<u8> {
    let mut label = format!("MASTER_KEY_{index}_").into_bytes();
    label.extend_from_slice(key.as_bytes());
    label
}

pub fn publish(ring: &KeyRing) -> KeyIndexTable {
    let entries = ring
        .iter()
        .map(|(key_index, key)| KeyIndexEntry {
            hash: hex::encode(Sha256::digest(label(key_index, key))),
            key_index,
        })
        .collect();
    KeyIndexTable { entries }
}

/// Render the TypeScript module consumed by the web client.
pub fn render_typescript(table: &KeyIndexTable, ring: &KeyRing, include_raw_keys: bool) -> String {
    let mut out = String::new();
    out.push_str("// Generated by `lumos publish`. Do not edit.\n");
    out.push_str(&format!(
        "// {} key hashes cover every issued code.\n",
        table.len()
    ));
    out.push_str("export const MASTER_KEY_HASHES: Record<string, number> = {\n");
    for entry in table.entries() {
        out.push_str(&format!("    \"{}\": {},\n", entry.hash, entry.key_index));
    }
    out.push_str("};\n");

    if include_raw_keys {
        let keys: Vec<String> = ring
            .iter()
            .map(|(_, key)| String::from_utf8_lossy(key.as_bytes()).into_owned())
            .collect();
        // serde_json output is a valid TS array literal with escaping handled.
        let literal = serde_json::to_string_pretty(&keys).unwrap_or_else(|_| "[]".into());
        out.push_str("\n// Raw master keys. Anyone holding these can mint codes.\n");
        out.push_str(&format!("export const MASTER_KEYS = {literal};\n"));
    }

    out
}

/// Write the rendered artifact atomically.
pub fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    atomic_write(path, contents.as_bytes())
        .with_context(|| format!("writing key-index artifact: {}", path.display()))?;
    info!("wrote key-index artifact {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_hashes() {
        let table = publish(&KeyRing::builtin());

        assert_eq!(table.len(), 5);
        assert_eq!(
            table.entries()[0].hash,
            "b32cba4e7073867a029d84786fa665de049ca5fe3ad4c9f26745e662bc20aed9"
        );
        assert_eq!(
            table.entries()[4].hash,
            "99b28ae3446102167206cf8bb67fb322a8a4245493ae9b00d96d10b581b8a9ad"
        );
        for (i, entry) in table.entries().iter().enumerate() {
            assert_eq!(entry.key_index, i);
        }
    }

    #[test]
    fn test_resolve() {
        let table = publish(&KeyRing::builtin());
        assert_eq!(
            table.resolve("58e9f60c90a736697110b2547afa32e483dbccdd48a5b593c38d137bdd8f3802"),
            Some(1)
        );
        assert_eq!(
            table.resolve("58E9F60C90A736697110B2547AFA32E483DBCCDD48A5B593C38D137BDD8F3802"),
            Some(1)
        );
        assert_eq!(table.resolve("00"), None);
    }

    #[test]
    fn test_same_key_at_different_index_hashes_differently() {
        let ring = KeyRing::from_strs(["same", "same"]).unwrap();
        let table = publish(&ring);
        assert_ne!(table.entries()[0].hash, table.entries()[1].hash);
    }

    #[test]
    fn test_render_omits_raw_keys_by_default() {
        let ring = KeyRing::builtin();
        let ts = render_typescript(&publish(&ring), &ring, false);

        assert!(ts.contains("export const MASTER_KEY_HASHES: Record<string, number> = {"));
        assert!(ts.contains(
            "\"07e78056b7cec9cb3f74301ec889591fa503557dbf04e836ef485e9815d7caf6\": 3,"
        ));
        assert!(!ts.contains("MASTER_KEYS ="));
        assert!(!ts.contains("LUMOS_MASTER_KEY_ALPHA"));
    }

    #[test]
    fn test_render_with_raw_keys() {
        let ring = KeyRing::builtin();
        let ts = render_typescript(&publish(&ring), &ring, true);

        assert!(ts.contains("export const MASTER_KEYS = ["));
        assert!(ts.contains("\"LUMOS_MASTER_KEY_EPSILON\""));
    }

    #[test]
    fn test_write_artifact() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("src/constants/redemptionHashes.ts");

        write_artifact(&path, "export {};\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "export {};\n");
    }
}
