//! The status file: the job's only return channel.
//!
//! One line, no trailing newline: `0 <result path>` on success or
//! `1 <message>` on failure, with line breaks in the message turned into
//! `<br />`.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::ConversionError;

/// Line break replacement in failure messages.
const LINE_BREAK: &str = "<br />";

/// Writer for one job's status file.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    /// Status file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the status file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record success with the produced file.
    pub async fn write_success(&self, result: &Path) -> Result<(), ConversionError> {
        info!(result = %result.display(), "Job succeeded");
        self.write(&format!("0 {}", result.display())).await
    }

    /// Record failure with a message.
    pub async fn write_failure(&self, message: &str) -> Result<(), ConversionError> {
        error!(reason = %message, "Job failed");
        self.write(&format!("1 {}", sanitize_message(message))).await
    }

    async fn write(&self, line: &str) -> Result<(), ConversionError> {
        tokio::fs::write(&self.path, line).await?;
        Ok(())
    }
}

/// Replace `\r\n`, `\n` and `\r` with `<br />`.
pub fn sanitize_message(message: &str) -> String {
    message
        .replace("\r\n", LINE_BREAK)
        .replace(['\n', '\r'], LINE_BREAK)
}
