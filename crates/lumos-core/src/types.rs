use serde::{Deserialize, Serialize};

/// One issued redemption code, as persisted in the registry file.
///
/// Field names match the on-disk JSON shape (`id`, `code`, `master_key_index`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    /// Identifier the code was issued for (starts at 1)
    #[serde(rename = "id")]
    pub identifier: u64,
    /// Full code text, e.g. `LUMOS-ABCDEFGH`
    pub code: String,
    /// Index into the key ring of the key that produced `code`
    #[serde(rename = "master_key_index")]
    pub key_index: usize,
}
