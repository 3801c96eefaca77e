//! Intermediate formats emitted by the translation tool.

pub mod registry;

pub use registry::{FormatEntry, FormatRegistry, IntermediateFormat, normalize_extension};
