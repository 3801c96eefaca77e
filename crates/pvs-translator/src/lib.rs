//! # PVS Translator
//!
//! Converts a CAD document (assembly, part or drawing) into a PVS
//! visualization package by chaining external conversion tools and
//! reconciling the files they leave behind.
//!
//! One job per process: a control file names the source document and the
//! input/output directories, a job manifest lists additional deliverables,
//! and a single-line status file reports the outcome.
//!
//! ## Tool Discovery
//!
//! The translation service is looked up under its configured install home;
//! the view refresh helper and the PVS converters come from a `bin`
//! directory next to the running binary unless configured explicitly.

pub mod archive;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod filesystem;
pub mod formats;
pub mod metrics;
pub mod models;
pub mod naming;
pub mod processor;
pub mod reconciler;
pub mod sidecar;
pub mod status;
pub mod tools;

pub use config::Settings;
pub use descriptor::JobDescriptor;
pub use error::ConversionError;
pub use executor::{ToolExecutor, ToolInvocation, ToolResult};
pub use formats::{FormatRegistry, IntermediateFormat};
pub use models::{JobOutcome, SourceKind, StageOutcome};
pub use processor::ConversionProcessor;
pub use status::StatusFile;
pub use tools::ToolPaths;
