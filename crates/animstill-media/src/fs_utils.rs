//! Filesystem helpers for job artifacts.
//!
//! Artifact deletion is idempotent: a file that is already gone counts as
//! removed, so cleanup can run more than once for the same job.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::error::MediaResult;

/// Remove a file, treating a missing file as success.
///
/// Returns `true` when a file was actually deleted.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    let path = path.as_ref();

    match fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed artifact");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal of several artifacts.
///
/// Failures are logged and skipped. Returns how many files were deleted.
pub async fn remove_files<P: AsRef<Path>>(paths: &[P]) -> usize {
    let mut removed = 0;

    for path in paths {
        let path = path.as_ref();
        match remove_file_if_exists(path).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact");
            }
        }
    }

    removed
}

/// Remove the regular files directly inside `dir`, optionally only those
/// with the given extension. Subdirectories are left alone.
///
/// Returns how many files were deleted.
pub async fn sweep_dir(dir: impl AsRef<Path>, extension: Option<&str>) -> MediaResult<usize> {
    let dir = dir.as_ref();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut stale = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = extension.map_or(true, |ext| {
            path.extension().is_some_and(|found| found.eq_ignore_ascii_case(ext))
        });
        if matches {
            stale.push(path);
        }
    }

    let removed = remove_files(&stale).await;
    if removed > 0 {
        tracing::info!(dir = %dir.display(), removed, "Swept stale artifacts");
    }
    Ok(removed)
}

/// Create a directory and its parents if missing.
pub async fn ensure_dir(path: impl AsRef<Path>) -> MediaResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).await?;
        tracing::debug!(path = %path.display(), "Created directory");
    }
    Ok(())
}
