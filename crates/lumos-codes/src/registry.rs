//! Registry of issued codes — the only persisted state.
//!
//! The whole registry is read into memory at the start of a run and the whole
//! sequence is rewritten at the end (temp file + rename). There is no lock:
//! two concurrent runs race and the last writer wins.
//!
//! Load never fails. An absent, unreadable, or unparsable file yields an empty
//! registry and the reason is reported through [`LoadOutcome`].

use anyhow::{Context, Result};
use lumos_core::{CodeRecord, LumosError, LumosResult};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::atomic::atomic_write;

/// How `Registry::load` obtained its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file at the path; starting from identifier 1
    Missing,
    /// File parsed
    Loaded,
    /// File existed but could not be read or parsed; treated as empty
    Recovered(String),
}

/// Append-only, ordered sequence of issued code records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    records: Vec<CodeRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CodeRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: &Path) -> (Self, LoadOutcome) {
        if !path.exists() {
            info!("no registry at {}, starting empty", path.display());
            return (Self::new(), LoadOutcome::Missing);
        }

        let parsed = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry: {}", path.display()))
            .and_then(|content| {
                serde_json::from_str::<Vec<CodeRecord>>(&content)
                    .with_context(|| format!("parsing registry: {}", path.display()))
            });

        match parsed {
            Ok(records) => {
                info!(records = records.len(), "loaded registry {}", path.display());
                (Self { records }, LoadOutcome::Loaded)
            }
            Err(e) => {
                warn!("registry unusable, treating as empty: {e:#}");
                (Self::new(), LoadOutcome::Recovered(format!("{e:#}")))
            }
        }
    }

    /// Rewrite the whole registry at `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records).context("serializing registry")?;
        atomic_write(path, json.as_bytes())?;
        info!(records = self.records.len(), "wrote registry {}", path.display());
        Ok(())
    }

    /// `max(identifier) + 1`, or 1 when empty.
    pub fn next_identifier(&self) -> LumosResult<u64> {
        match self.records.iter().map(|r| r.identifier).max() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                LumosError::IdentifierOverflow(format!("registry already holds #{max}"))
            }),
        }
    }

    pub fn records(&self) -> &[CodeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record issued with exactly this code text.
    pub fn find_code(&self, code: &str) -> Option<&CodeRecord> {
        self.records.iter().find(|r| r.code == code)
    }

    pub(crate) fn append(&mut self, records: impl IntoIterator<Item = CodeRecord>) {
        self.records.extend(records);
    }
}

/// Copy an unusable registry file aside before it is overwritten.
///
/// Returns the backup path, `<path>.corrupt.<unix-seconds>`.
pub fn backup_unreadable(path: &Path) -> Result<PathBuf> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt.{now}"));
    let backup = path.with_file_name(name);

    std::fs::copy(path, &backup)
        .with_context(|| format!("backing up {} to {}", path.display(), backup.display()))?;
    warn!("unusable registry copied to {}", backup.display());
    Ok(backup)
}
