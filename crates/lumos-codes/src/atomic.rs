use anyhow::{Context, Result};
use std::path::Path;

/// Replace `path` with `contents` via a sibling temp file and a rename.
///
/// Creates the parent directory when missing. A crash leaves either the old
/// file or the new one, never a truncated mix.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory: {}", parent.display()))?;
    }

    let tmp_path = path.with_file_name(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));
    std::fs::write(&tmp_path, contents)
        .with_context(|| format!("writing temp file: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), path.display()))?;

    Ok(())
}
