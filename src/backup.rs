use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::debug;

/// Copy `source` to `<dir>/<stem>_<timestamp>.<ext>`, creating `dir` as needed.
pub fn backup_copy(source: &Path, dir: &Path, at: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create backup directory {}", dir.display()))?;

    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "directive".to_string());
    let stamp = at.format("%Y%m%d_%H%M%S%.3f");
    let name = match source.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    };
    let target = dir.join(name);

    fs::copy(source, &target).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    debug!(source = %source.display(), target = %target.display(), "directive backed up");
    Ok(target)
}
