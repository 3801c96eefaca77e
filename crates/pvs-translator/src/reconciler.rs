//! Output reconciliation.
//!
//! Tools and earlier runs may leave zero, one or several files of a given
//! extension in the output directory. The reconciler classifies them and,
//! when there are several, bundles them into one deterministic archive.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive::{ArchivePackager, PackEntry, TransferMode};
use crate::descriptor::JobDescriptor;
use crate::error::ConversionError;
use crate::filesystem::FsUtils;

/// Files of one extension found in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Nothing found.
    None,
    /// Exactly one file.
    Single(PathBuf),
    /// Several files, sorted by name.
    Multiple(Vec<PathBuf>),
}

impl Discovery {
    fn from_files(mut files: Vec<PathBuf>) -> Self {
        match files.len() {
            0 => Discovery::None,
            1 => Discovery::Single(files.remove(0)),
            _ => Discovery::Multiple(files),
        }
    }
}

/// Scans and groups per-extension outputs of one job.
#[derive(Debug, Clone)]
pub struct OutputReconciler {
    output_dir: PathBuf,
    file_name: String,
    file_type: String,
}

impl OutputReconciler {
    /// Reconciler for a job's output directory.
    pub fn new(descriptor: &JobDescriptor) -> Self {
        Self {
            output_dir: descriptor.output_dir().to_path_buf(),
            file_name: descriptor.file_name().to_string(),
            file_type: descriptor.file_type().to_string(),
        }
    }

    /// Directory being reconciled.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<ext>_<name>_<type>`.
    fn stem(&self, ext: &str) -> String {
        format!("{}_{}_{}", ext, self.file_name, self.file_type)
    }

    /// Deliverable name for one file: `<ext>_<name>_<type>.<ext>`.
    pub fn target_name(&self, ext: &str) -> String {
        format!("{}.{}", self.stem(ext), ext)
    }

    /// Archive name for several files: `<ext>_<name>_<type>.zip`.
    pub fn archive_name(&self, ext: &str) -> String {
        format!("{}.zip", self.stem(ext))
    }

    /// Name of the `index`-th archive member (1-based).
    pub fn member_name(&self, ext: &str, index: usize) -> String {
        format!("{}_{}.{}", self.stem(ext), index, ext)
    }

    /// Classify the files of extension `ext` (case-insensitive).
    pub async fn discover(&self, ext: &str) -> Result<Discovery, ConversionError> {
        let files = FsUtils::list_files_with_extension(&self.output_dir, ext).await?;
        debug!(ext, count = files.len(), "Scanned output directory");
        Ok(Discovery::from_files(files))
    }

    /// Bundle `candidates` into `<ext>_<name>_<type>.zip`.
    ///
    /// Members are ordered by creation time (modification time where the
    /// platform has none), then modification time, then name, and renamed
    /// `<ext>_<name>_<type>_<i>.<ext>`. Candidates are moved into the
    /// archive except `preserve`, which is copied.
    pub async fn group(
        &self,
        ext: &str,
        candidates: Vec<PathBuf>,
        packager: &ArchivePackager,
        preserve: Option<&Path>,
    ) -> Result<PathBuf, ConversionError> {
        let mut keyed = Vec::with_capacity(candidates.len());
        for path in candidates {
            let (created, modified) = FsUtils::file_times(&path).await;
            keyed.push(((created, modified), FsUtils::extract_filename_str(&path), path));
        }
        // Creation stamps share a coarse tick; modification time breaks ties.
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let entries: Vec<PackEntry> = keyed
            .into_iter()
            .enumerate()
            .map(|(i, (_, _, source))| {
                let mode = if preserve == Some(source.as_path()) {
                    TransferMode::Copy
                } else {
                    TransferMode::Move
                };
                PackEntry {
                    source,
                    name: self.member_name(ext, i + 1),
                    mode,
                }
            })
            .collect();

        info!(ext, files = entries.len(), "Grouping outputs into archive");
        packager.pack(&entries, &self.archive_name(ext)).await
    }
}
