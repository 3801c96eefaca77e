//! Format tag ↔ canonical extension mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

// ---------------------------------------------------------------------------
// Format table macro
// ---------------------------------------------------------------------------

macro_rules! define_formats {
    ($($variant:ident => $ext:literal, $label:literal),* $(,)?) => {
        /// Formats the translation tool can emit for downstream use.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum IntermediateFormat {
            $(
                #[doc = $label]
                $variant,
            )*
        }

        impl IntermediateFormat {
            /// Every format, in registration order.
            pub const ALL: &'static [IntermediateFormat] = &[$(IntermediateFormat::$variant,)*];

            /// Canonical lowercase extension of this format.
            pub fn canonical_extension(&self) -> &'static str {
                match self {
                    $(IntermediateFormat::$variant => $ext,)*
                }
            }

            /// Upper-case tag used in logs and messages.
            pub fn tag(&self) -> &'static str {
                match self {
                    $(IntermediateFormat::$variant => $label,)*
                }
            }
        }
    };
}

define_formats! {
    Stp       => "stp", "STP",
    Jt        => "jt",  "JT",
    Pdf       => "pdf", "PDF",
    Igs       => "igs", "IGS",
    Dwg       => "dwg", "DWG",
    Dxf       => "dxf", "DXF",
    Sat       => "sat", "SAT",
    Stl       => "stl", "STL",
    Parasolid => "x_t", "PARASOLID",
}

impl IntermediateFormat {
    /// Parse the configured intermediate format for the 3D branch.
    ///
    /// Only STEP (`STEP`/`STP`) and JT have a downstream PVS converter.
    pub fn parse_intermediate(name: &str) -> Result<Self, ConversionError> {
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case("step") || trimmed.eq_ignore_ascii_case("stp") {
            Ok(IntermediateFormat::Stp)
        } else if trimmed.eq_ignore_ascii_case("jt") {
            Ok(IntermediateFormat::Jt)
        } else {
            Err(ConversionError::UnsupportedIntermediate {
                format: name.to_string(),
            })
        }
    }
}

impl fmt::Display for IntermediateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Normalize a manifest file type to a canonical extension.
///
/// Lower-cases the value and folds the long spellings the publishing
/// service uses (`step`, `iges`, `parasolid`) onto their extensions.
pub fn normalize_extension(file_type: &str) -> String {
    let lower = file_type.trim().to_lowercase();
    match lower.as_str() {
        "step" => "stp".to_string(),
        "iges" => "igs".to_string(),
        "parasolid" => "x_t".to_string(),
        _ => lower,
    }
}

/// One registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatEntry {
    /// Logical format tag.
    pub format: IntermediateFormat,
    /// Canonical lowercase extension.
    pub extension: &'static str,
}

/// Read-only lookup table between formats and extensions.
///
/// Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    entries: Vec<FormatEntry>,
}

impl FormatRegistry {
    /// Registry containing every known intermediate format.
    pub fn standard() -> Self {
        Self::with_formats(IntermediateFormat::ALL)
    }

    /// Registry restricted to the given formats.
    pub fn with_formats(formats: &[IntermediateFormat]) -> Self {
        let mut entries: Vec<FormatEntry> = Vec::with_capacity(formats.len());
        for format in formats {
            if entries.iter().any(|e| e.format == *format) {
                continue;
            }
            entries.push(FormatEntry {
                format: *format,
                extension: format.canonical_extension(),
            });
        }
        Self { entries }
    }

    /// Extension registered for `format`.
    pub fn extension_for(&self, format: IntermediateFormat) -> Result<&'static str, ConversionError> {
        self.entries
            .iter()
            .find(|e| e.format == format)
            .map(|e| e.extension)
            .ok_or_else(|| ConversionError::UnsupportedFormat {
                format: format.tag().to_string(),
            })
    }

    /// Format registered for `extension` (case-insensitive linear scan).
    pub fn format_for(&self, extension: &str) -> Result<IntermediateFormat, ConversionError> {
        let wanted = extension.trim_start_matches('.');
        self.entries
            .iter()
            .find(|e| e.extension.eq_ignore_ascii_case(wanted))
            .map(|e| e.format)
            .ok_or_else(|| ConversionError::UnsupportedFormat {
                format: extension.to_string(),
            })
    }

    /// All registered rows.
    pub fn entries(&self) -> &[FormatEntry] {
        &self.entries
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
