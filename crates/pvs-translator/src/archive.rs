//! Archive packaging.
//!
//! Files are gathered under their archive names in a fresh
//! `<target>/<uuid-v7>` working directory, zipped to a temporary file on a
//! blocking thread and renamed into place. The working directory never
//! outlives the call.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::ConversionError;
use crate::filesystem::FsUtils;

/// How an entry reaches the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// The source is consumed.
    Move,
    /// The source stays where it is.
    Copy,
}

/// One file to place into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    /// File on disk.
    pub source: PathBuf,
    /// Name inside the archive.
    pub name: String,
    /// Move or copy.
    pub mode: TransferMode,
}

impl PackEntry {
    /// Entry that moves `source` into the archive as `name`.
    pub fn moved(source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            mode: TransferMode::Move,
        }
    }

    /// Entry that copies `source` into the archive as `name`.
    pub fn copied(source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            mode: TransferMode::Copy,
        }
    }
}

/// Writes archives into one target directory.
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    target_dir: PathBuf,
}

impl ArchivePackager {
    /// Packager writing into `target_dir`.
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    /// Directory archives are written to.
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Bundle `entries` into `<target_dir>/<archive_name>`, replacing any
    /// existing file of that name.
    pub async fn pack(
        &self,
        entries: &[PackEntry],
        archive_name: &str,
    ) -> Result<PathBuf, ConversionError> {
        let id = Uuid::now_v7().simple().to_string();
        let work_dir = self.target_dir.join(&id);
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self.pack_in(&work_dir, &id, entries, archive_name).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(
                dir = %work_dir.display(),
                error = %e,
                "Failed to remove packaging directory"
            );
        }

        result
    }

    async fn pack_in(
        &self,
        work_dir: &Path,
        id: &str,
        entries: &[PackEntry],
        archive_name: &str,
    ) -> Result<PathBuf, ConversionError> {
        for entry in entries {
            let dest = work_dir.join(&entry.name);
            debug!(
                source = %entry.source.display(),
                name = %entry.name,
                mode = ?entry.mode,
                "Staging archive entry"
            );
            match entry.mode {
                TransferMode::Move => FsUtils::move_file(&entry.source, &dest).await?,
                TransferMode::Copy => {
                    tokio::fs::copy(&entry.source, &dest).await?;
                }
            }
        }

        let temp_zip = self.target_dir.join(format!("{id}.zip.tmp"));
        let source_dir = work_dir.to_path_buf();
        let zip_path = temp_zip.clone();
        let zipped = tokio::task::spawn_blocking(move || zip_directory(&source_dir, &zip_path))
            .await?;

        let count = match zipped {
            Ok(count) => count,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_zip).await;
                return Err(ConversionError::Packaging {
                    archive: archive_name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let final_path = self.target_dir.join(archive_name);
        if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            tokio::fs::remove_file(&final_path).await?;
        }
        if let Err(e) = tokio::fs::rename(&temp_zip, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_zip).await;
            return Err(ConversionError::Packaging {
                archive: archive_name.to_string(),
                reason: e.to_string(),
            });
        }

        info!(archive = %final_path.display(), files = count, "Archive created");
        Ok(final_path)
    }
}

/// Deflate every regular file in `dir` into a zip at `dest`, in name order.
fn zip_directory(dir: &Path, dest: &Path) -> Result<usize, ConversionError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut writer = zip::ZipWriter::new(BufWriter::new(File::create(dest)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        writer.start_file(FsUtils::extract_filename_str(path), options)?;
        let mut source = File::open(path)?;
        std::io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?.flush()?;
    Ok(files.len())
}
