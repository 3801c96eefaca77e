//! Domain models: source kinds and stage/job outcomes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

// ---------------------------------------------------------------------------
// Source kind
// ---------------------------------------------------------------------------

/// Classification of the source document's file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Assembly (`.asm`).
    Assembly,
    /// Part, sheet metal and anything not otherwise classified.
    Part,
    /// 2D drawing (`.dft`).
    Drawing,
}

impl SourceKind {
    /// Classify a file-type extension (case-insensitive).
    pub fn from_file_type(file_type: &str) -> Self {
        let ext = file_type.trim_start_matches('.');
        if ext.eq_ignore_ascii_case("dft") {
            SourceKind::Drawing
        } else if ext.eq_ignore_ascii_case("asm") {
            SourceKind::Assembly
        } else {
            SourceKind::Part
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Stage produced the given file.
    Succeeded(PathBuf),
    /// Stage failed; the message is what the status file receives.
    Failed(String),
}

impl StageOutcome {
    /// Whether the stage succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Succeeded(_))
    }
}

impl From<Result<PathBuf, ConversionError>> for StageOutcome {
    fn from(result: Result<PathBuf, ConversionError>) -> Self {
        match result {
            Ok(path) => StageOutcome::Succeeded(path),
            Err(e) => StageOutcome::Failed(e.to_string()),
        }
    }
}

/// Final result of a job, mirrored in the status file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The visualization file was produced.
    Succeeded {
        /// Binary PVS file.
        result: PathBuf,
        /// Bundle of additional-format deliverables, when any were requested.
        additionals: Option<PathBuf>,
    },
    /// A stage failed with the given message.
    Failed {
        /// Message written to the status file.
        message: String,
    },
}

impl JobOutcome {
    /// Whether the job succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}
