//! Job descriptor resolution: control file + job manifest → `JobDescriptor`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ConversionError;
use crate::formats::normalize_extension;
use crate::models::SourceKind;
use crate::naming::decode_name;

/// Manifest file the publishing service drops into every input directory.
pub const MANIFEST_FILE_NAME: &str = "_wvsjob.paj";

/// PID file left behind by the view refresh helper.
pub const PID_FILE_NAME: &str = "sedge.pid";

/// Number of tokens in a control line.
const CONTROL_TOKENS: usize = 6;

/// Resolved, immutable description of one conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    file_name: String,
    file_type: String,
    format_name: String,
    input_dir: PathBuf,
    output_dir: PathBuf,
    additional_formats: BTreeSet<String>,
}

impl JobDescriptor {
    /// Build a descriptor from already-decoded parts.
    ///
    /// Additional formats are normalized and deduplicated.
    pub fn new<I, S>(
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        format_name: impl Into<String>,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        additional_formats: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            file_name: file_name.into(),
            file_type: file_type.into(),
            format_name: format_name.into(),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            additional_formats: additional_formats
                .into_iter()
                .map(|f| normalize_extension(f.as_ref()))
                .collect(),
        }
    }

    /// Resolve a descriptor from a control file and the manifest it points at.
    pub async fn from_control_file(path: &Path) -> Result<Self, ConversionError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConversionError::MissingInputFile {
                path: path.to_path_buf(),
            });
        }

        let raw = tokio::fs::read(path).await?;
        let content = String::from_utf8_lossy(&raw);
        let line = content.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ConversionError::EmptyInputFile {
                path: path.to_path_buf(),
            });
        }

        let tokens: Vec<&str> = line.split(' ').collect();
        if tokens.len() < CONTROL_TOKENS {
            return Err(ConversionError::MalformedInput {
                path: path.to_path_buf(),
                expected: CONTROL_TOKENS,
                found: tokens.len(),
            });
        }
        if tokens.len() > CONTROL_TOKENS {
            warn!(
                path = %path.display(),
                found = tokens.len(),
                "Control file carries extra tokens, ignoring them"
            );
        }

        let input_dir = PathBuf::from(tokens[4]);
        let manifest_path = input_dir.join(MANIFEST_FILE_NAME);
        if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            return Err(ConversionError::ManifestMissing {
                path: manifest_path,
            });
        }

        let manifest = tokio::fs::read(&manifest_path).await?;
        let additional_formats =
            parse_additional_formats(&String::from_utf8_lossy(&manifest), &manifest_path)?;

        let descriptor = Self {
            file_name: decode_name(tokens[0])?,
            file_type: tokens[1].to_string(),
            format_name: tokens[2].to_string(),
            input_dir,
            output_dir: PathBuf::from(tokens[5]),
            additional_formats,
        };

        debug!(descriptor = %descriptor, "Resolved job descriptor");
        Ok(descriptor)
    }

    /// Decoded base file name (no extension).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Source file-type extension, e.g. `asm`, `par`, `dft`.
    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    /// Target format requested by the publisher.
    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    /// Directory holding the source document and manifest.
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Directory receiving all outputs.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Normalized additional output extensions.
    pub fn additional_formats(&self) -> &BTreeSet<String> {
        &self.additional_formats
    }

    /// Classification of the source file type.
    pub fn source_kind(&self) -> SourceKind {
        SourceKind::from_file_type(&self.file_type)
    }

    /// Whether the source is a 2D drawing.
    pub fn is_drawing(&self) -> bool {
        self.source_kind() == SourceKind::Drawing
    }

    /// `<input-dir>/<name>.<type>`.
    pub fn source_path(&self) -> PathBuf {
        self.input_dir
            .join(format!("{}.{}", self.file_name, self.file_type))
    }

    /// Side-channel log the translation tool writes next to the source.
    pub fn tool_log_path(&self) -> PathBuf {
        self.input_dir.join(format!("{}.log", self.file_name))
    }

    /// PID file of a detached refresh helper.
    pub fn pid_file_path(&self) -> PathBuf {
        self.input_dir.join(PID_FILE_NAME)
    }

    /// `<output-dir>/<name>.<extension>`.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.file_name, extension))
    }
}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileName: {}, FileType: {}, FormatName: {}, ConversionInputDir: {}, ConversionOutputDir: {}, AdditionalFileFormats [{}]",
            self.file_name,
            self.file_type,
            self.format_name,
            self.input_dir.display(),
            self.output_dir.display(),
            self.additional_formats
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Collect `//publish/output[@typename='ALTFILE']/file/@type`, normalized.
fn parse_additional_formats(
    xml: &str,
    manifest_path: &Path,
) -> Result<BTreeSet<String>, ConversionError> {
    let doc = roxmltree::Document::parse(xml).map_err(|source| {
        ConversionError::ManifestMalformed {
            path: manifest_path.to_path_buf(),
            source,
        }
    })?;

    let mut formats = BTreeSet::new();
    for file in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "file")
    {
        let Some(output) = file.parent_element() else {
            continue;
        };
        if output.tag_name().name() != "output" || output.attribute("typename") != Some("ALTFILE")
        {
            continue;
        }
        let in_publish = output
            .parent_element()
            .is_some_and(|p| p.tag_name().name() == "publish");
        if !in_publish {
            continue;
        }

        match file.attribute("type") {
            Some(file_type) if !file_type.trim().is_empty() => {
                formats.insert(normalize_extension(file_type));
            }
            _ => {
                warn!(
                    manifest = %manifest_path.display(),
                    "ALTFILE entry without a type attribute, skipping"
                );
            }
        }
    }

    Ok(formats)
}
