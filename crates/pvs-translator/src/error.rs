//! Unified error type for the PVS translation pipeline.
//!
//! Descriptor, manifest, registry, tool-invocation and packaging failures
//! are consolidated into a single `ConversionError` enum. Stage code turns
//! these into status-file messages; only errors raised before the first
//! stage reach the binary's top-level handler.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all conversion operations.
#[derive(Debug, Error)]
pub enum ConversionError {
    // --- Input errors ---
    /// The control file does not exist.
    #[error("File not found {path}")]
    MissingInputFile {
        /// Path of the control file.
        path: PathBuf,
    },

    /// The control file exists but is empty.
    #[error("Wrong input file {path} the file is empty")]
    EmptyInputFile {
        /// Path of the control file.
        path: PathBuf,
    },

    /// The control file does not carry enough tokens.
    #[error("Wrong input file {path} expected {expected} tokens, found {found}")]
    MalformedInput {
        /// Path of the control file.
        path: PathBuf,
        /// Number of tokens required.
        expected: usize,
        /// Number of tokens present.
        found: usize,
    },

    /// An `@` escape in the encoded file name is truncated or invalid.
    #[error("Invalid escape sequence '{sequence}' at offset {offset} in encoded name '{name}'")]
    InvalidNameEscape {
        /// The full encoded name.
        name: String,
        /// Character offset of the escape introducer.
        offset: usize,
        /// The characters that could not be decoded.
        sequence: String,
    },

    /// A character has no representation in the name encoding.
    #[error("Character U+{code_point:04X} cannot be encoded in a file name")]
    UnencodableCharacter {
        /// The offending code point.
        code_point: u32,
    },

    // --- Manifest errors ---
    /// The job manifest is missing from the input directory.
    #[error("WVS job file not found {path}")]
    ManifestMissing {
        /// Expected manifest path.
        path: PathBuf,
    },

    /// The job manifest is not well-formed XML.
    #[error("Malformed job manifest {path}: {source}")]
    ManifestMalformed {
        /// Manifest path.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: roxmltree::Error,
    },

    // --- Registry errors ---
    /// The configured intermediate type has no PVS converter.
    #[error("Intermediate configured type {format} is not supported, check worker configuration")]
    UnsupportedIntermediate {
        /// The configured value.
        format: String,
    },

    /// The format or extension is not in the registry.
    #[error("Format {format} is not registered")]
    UnsupportedFormat {
        /// The requested format or extension.
        format: String,
    },

    // --- Tool invocation errors ---
    /// A configured tool executable does not exist.
    #[error("{tool} executable not found: {path}")]
    ToolNotFound {
        /// Tool label.
        tool: String,
        /// The configured path.
        path: PathBuf,
    },

    /// The tool process could not be started.
    #[error("Failed to start {tool}: {source}")]
    ToolSpawn {
        /// Tool label.
        tool: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// A tool ran but did not yield a usable result.
    #[error("{message}")]
    ToolFailed {
        /// Tool label.
        tool: String,
        /// Status message describing the failure.
        message: String,
    },

    /// A tool exited cleanly but its result file is absent.
    #[error("{message}")]
    OutputMissing {
        /// Tool label.
        tool: String,
        /// Expected output path.
        path: PathBuf,
        /// Status message describing the failure.
        message: String,
    },

    // --- Packaging errors ---
    /// Archive creation or placement failed.
    #[error("Packaging failed for {archive}: {reason}")]
    Packaging {
        /// Destination archive name.
        archive: String,
        /// Description of the failure.
        reason: String,
    },

    /// The ASCII PVS sidecar could not be written.
    #[error("Failed to generate ascii pvs file: {reason}")]
    Sidecar {
        /// Description of the failure.
        reason: String,
    },

    // --- Configuration errors ---
    /// Configuration sources could not be merged or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration values failed validation.
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // --- Generic errors ---
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP library error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Tokio task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ConversionError {
    /// Whether this error belongs to the input-file category.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ConversionError::MissingInputFile { .. }
                | ConversionError::EmptyInputFile { .. }
                | ConversionError::MalformedInput { .. }
                | ConversionError::InvalidNameEscape { .. }
        )
    }

    /// Whether this error belongs to the manifest category.
    pub fn is_manifest_error(&self) -> bool {
        matches!(
            self,
            ConversionError::ManifestMissing { .. } | ConversionError::ManifestMalformed { .. }
        )
    }
}
