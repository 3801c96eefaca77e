//! Sidecar files: the ASCII PVS manifest wrapping a drawing's PDF, and the
//! viewer loader options.

use std::path::{Path, PathBuf};

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use tracing::debug;

use crate::descriptor::JobDescriptor;
use crate::error::ConversionError;
use crate::filesystem::FsUtils;

/// Loader options file name.
pub const LOADER_OPTIONS_FILE: &str = "loaderoptions.txt";

/// Loader options content requesting thumbnail creation.
const LOADER_OPTIONS: &str = "thumbnailcreate=true\n";

/// Marker distinguishing the ASCII sidecar from the binary result.
pub const ASCII_PVS_MARKER: &str = "_ascii.";

/// `<output-dir>/<name>_ascii.pvs`.
pub fn ascii_pvs_path(descriptor: &JobDescriptor) -> PathBuf {
    descriptor
        .output_dir()
        .join(format!("{}_ascii.pvs", descriptor.file_name()))
}

/// Write the ASCII PVS manifest referencing `pdf_path` and return its path.
pub async fn write_ascii_pvs(
    descriptor: &JobDescriptor,
    pdf_path: &Path,
) -> Result<PathBuf, ConversionError> {
    let source_file_name = FsUtils::extract_filename_str(pdf_path);
    let xml = render_ascii_pvs(descriptor.file_name(), &source_file_name)
        .map_err(|e| ConversionError::Sidecar {
            reason: e.to_string(),
        })?;

    let path = ascii_pvs_path(descriptor);
    tokio::fs::write(&path, xml)
        .await
        .map_err(|e| ConversionError::Sidecar {
            reason: format!("{}: {}", path.display(), e),
        })?;

    debug!(path = %path.display(), source = %source_file_name, "ASCII PVS written");
    Ok(path)
}

fn render_ascii_pvs(component: &str, source_file_name: &str) -> Result<Vec<u8>, quick_xml::Error> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

    w.write_event(Event::Start(
        BytesStart::new("PV_FILE").with_attributes([("type", "PVS"), ("version", "0303")]),
    ))?;

    w.write_event(Event::Start(BytesStart::new("section_index")))?;
    for section in ["2", "3"] {
        w.write_event(Event::Empty(
            BytesStart::new("internal_section").with_attributes([("type", section)]),
        ))?;
    }
    w.write_event(Event::End(BytesEnd::new("section_index")))?;

    w.write_event(Event::Start(BytesStart::new("section_structure")))?;
    w.write_event(Event::Start(
        BytesStart::new("component").with_attributes([("name", component)]),
    ))?;
    w.write_event(Event::Empty(
        BytesStart::new("document_source").with_attributes([("file_name", source_file_name)]),
    ))?;
    w.write_event(Event::End(BytesEnd::new("component")))?;
    w.write_event(Event::End(BytesEnd::new("section_structure")))?;

    w.write_event(Event::Start(BytesStart::new("section_properties")))?;
    w.write_event(Event::Start(BytesStart::new("property_component_ref")))?;
    w.write_event(Event::Empty(BytesStart::new("property").with_attributes([
        ("name", "Source_file_name"),
        ("value", source_file_name),
    ])))?;
    w.write_event(Event::End(BytesEnd::new("property_component_ref")))?;
    w.write_event(Event::End(BytesEnd::new("section_properties")))?;

    w.write_event(Event::End(BytesEnd::new("PV_FILE")))?;

    Ok(w.into_inner())
}

/// Write `loaderoptions.txt` into `output_dir`.
pub async fn write_loader_options(output_dir: &Path) -> Result<PathBuf, ConversionError> {
    let path = output_dir.join(LOADER_OPTIONS_FILE);
    tokio::fs::write(&path, LOADER_OPTIONS).await?;
    debug!(path = %path.display(), "Loader options written");
    Ok(path)
}
