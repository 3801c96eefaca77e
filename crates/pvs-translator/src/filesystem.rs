//! Filesystem utilities for the conversion pipeline.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::ConversionError;

/// Filesystem utility functions.
pub struct FsUtils;

impl FsUtils {
    /// Extract a file name as `String`; `"unknown_file"` for empty paths.
    pub fn extract_filename_str(path: &Path) -> String {
        path.file_name()
            .and_then(|f| f.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown_file".to_string())
    }

    /// Whether `path` has extension `ext` (case-insensitive, leading `.` ignored).
    pub fn has_extension(path: &Path, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Regular files directly inside `dir` with extension `ext`, sorted by name.
    ///
    /// A missing directory yields an empty list.
    pub async fn list_files_with_extension(
        dir: &Path,
        ext: &str,
    ) -> Result<Vec<PathBuf>, ConversionError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConversionError::Io(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && Self::has_extension(&path, ext) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// First `*.pvs` in `dir` whose name passes `accept`.
    pub async fn find_pvs<F>(dir: &Path, accept: F) -> Result<Option<PathBuf>, ConversionError>
    where
        F: Fn(&str) -> bool,
    {
        let files = Self::list_files_with_extension(dir, "pvs").await?;
        Ok(files
            .into_iter()
            .find(|p| accept(&Self::extract_filename_str(p))))
    }

    /// Delete every `*.log` file in `dir`. Failures are logged and skipped.
    pub async fn delete_logs(dir: &Path) {
        let logs = match Self::list_files_with_extension(dir, "log").await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to list log files");
                return;
            }
        };

        for log in logs {
            match tokio::fs::remove_file(&log).await {
                Ok(()) => debug!(file = %log.display(), "Deleted tool log"),
                Err(e) => warn!(file = %log.display(), error = %e, "Failed to delete tool log"),
            }
        }
    }

    /// Move a file, falling back to copy + delete when a rename cannot
    /// cross devices.
    pub async fn move_file(from: &Path, to: &Path) -> Result<(), ConversionError> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                debug!(
                    from = %from.display(),
                    to = %to.display(),
                    "Rename crosses devices, copying instead"
                );
                tokio::fs::copy(from, to).await?;
                tokio::fs::remove_file(from).await?;
                Ok(())
            }
            Err(e) => Err(ConversionError::Io(e)),
        }
    }

    /// Creation and modification time. Creation falls back to modification
    /// where the platform has none; both are `None` if metadata is unreadable.
    pub async fn file_times(path: &Path) -> (Option<SystemTime>, Option<SystemTime>) {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return (None, None);
        };
        let modified = metadata.modified().ok();
        (metadata.created().ok().or(modified), modified)
    }
}
