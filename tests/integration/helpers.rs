//! Shared test helpers for integration tests.
//!
//! External tools are replaced by shell scripts installed where the tool
//! locator expects them.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pvs_translator::config::ToolSettings;
use pvs_translator::descriptor::MANIFEST_FILE_NAME;
use pvs_translator::metrics::MetricsSnapshot;
use pvs_translator::{ConversionError, ConversionProcessor, JobOutcome, Settings, StatusFile};

/// Translator that writes whatever `-o=` names and logs each call.
pub const TRANSLATOR_OK: &str = r#"
for arg in "$@"; do
  case "$arg" in
    -o=*) out="${arg#-o=}" ;;
    -t=*) ext="${arg#-t=}" ;;
  esac
done
echo "$ext" >> "$(dirname "$0")/calls.txt"
echo "translated to $ext"
echo "$ext data" > "$out"
"#;

/// STEP/JT → PVS converter: `-p <outdir> <intermediate>`.
pub const PVS_CONVERTER_OK: &str = r#"
name=$(basename "$3")
echo "pvs" > "$2/${name%.*}.pvs"
"#;

/// ASCII → binary converter:
/// `-Dradapter/outputAsciiED 0 -p <outdir> -o <name>.pvs <ascii>`.
pub const PVS_CHANGE_OK: &str = r#"
test -f "$7" || exit 4
echo "binary" > "$4/$6"
"#;

/// A fake job: input/output directories, manifest, control file and tools.
pub struct TestJob {
    /// Scratch root
    pub temp: TempDir,
    /// Input directory (source document, manifest, tool log)
    pub input_dir: PathBuf,
    /// Output directory
    pub output_dir: PathBuf,
    /// Bundled tools directory
    pub bundle_dir: PathBuf,
    /// Translation service install home
    pub install_home: PathBuf,
    /// Control file handed to the processor
    pub control_file: PathBuf,
    /// Status file
    pub status_file: PathBuf,
    /// Settings used by `run`
    pub settings: Settings,
}

impl TestJob {
    /// Create a job for `<name>.<file_type>` requesting `alt_formats`.
    pub fn new(name: &str, file_type: &str, alt_formats: &[&str]) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        let input_dir = root.join("in");
        let output_dir = root.join("out");
        let bundle_dir = root.join("bin");
        let install_home = root.join("se");
        for dir in [&input_dir, &bundle_dir, &install_home.join("Program")] {
            std::fs::create_dir_all(dir).expect("mkdir");
        }

        std::fs::write(input_dir.join(format!("{name}.{file_type}")), b"cad").expect("source");

        let files: String = alt_formats
            .iter()
            .map(|f| format!("<output typename=\"ALTFILE\"><file type=\"{f}\"/></output>"))
            .collect();
        std::fs::write(
            input_dir.join(MANIFEST_FILE_NAME),
            format!("<job><publish>{files}</publish></job>"),
        )
        .expect("manifest");

        let control_file = root.join("job.in");
        std::fs::write(
            &control_file,
            format!(
                "{} {} PVS 0 {} {}\r\n",
                name,
                file_type,
                input_dir.display(),
                output_dir.display()
            ),
        )
        .expect("control");

        let settings = Settings {
            convert_asm_timeout_seconds: 30,
            convert_dft_timeout_seconds: 30,
            convert_part_timeout_seconds: 30,
            pvs_timeout_seconds: 30,
            refresh_view_timeout_seconds: 30,
            tools: ToolSettings {
                install_home: install_home.clone(),
                bundle_dir: Some(bundle_dir.clone()),
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            status_file: root.join("status.txt"),
            temp,
            input_dir,
            output_dir,
            bundle_dir,
            install_home,
            control_file,
            settings,
        }
    }

    /// Install the translation service script.
    pub fn install_translator(&self, body: &str) -> PathBuf {
        write_script(
            &self
                .install_home
                .join("Program")
                .join("SolidEdgeTranslationServices.exe"),
            body,
        )
    }

    /// Install a bundled tool script at `relative` (e.g. `STEP2PV/stepbatch.bat`).
    pub fn install_bundled(&self, relative: &str, body: &str) -> PathBuf {
        write_script(&self.bundle_dir.join(relative), body)
    }

    /// Install working translator and converters.
    pub fn install_working_tools(&self) {
        self.install_translator(TRANSLATOR_OK);
        self.install_bundled("STEP2PV/stepbatch.bat", PVS_CONVERTER_OK);
        self.install_bundled("JT2PV/jtbatch.bat", PVS_CONVERTER_OK);
        self.install_bundled("PVSCHANGE/pvschangebatch.bat", PVS_CHANGE_OK);
    }

    /// Formats the translator was asked for, in call order.
    pub fn translator_calls(&self) -> Vec<String> {
        let path = self.install_home.join("Program").join("calls.txt");
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Run the job through the processor.
    pub async fn run(&self) -> Result<(JobOutcome, MetricsSnapshot), ConversionError> {
        let processor = ConversionProcessor::new(self.settings.clone());
        let status = StatusFile::new(&self.status_file);
        let outcome = processor.execute_job(&self.control_file, &status).await?;
        Ok((outcome, processor.metrics_snapshot()))
    }

    /// Status file content.
    pub fn status(&self) -> String {
        std::fs::read_to_string(&self.status_file).expect("status file")
    }

    /// Path inside the output directory.
    pub fn out(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// File names currently in the output directory.
    pub fn output_files(&self) -> BTreeSet<String> {
        std::fs::read_dir(&self.output_dir)
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// Write an executable `/bin/sh` script.
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path.to_path_buf()
}

/// Set a file's modification time `seconds` into the past.
pub fn backdate(path: &Path, seconds: u64) {
    let when = std::time::SystemTime::now() - std::time::Duration::from_secs(seconds);
    std::fs::File::options()
        .write(true)
        .open(path)
        .expect("open")
        .set_modified(when)
        .expect("set_modified");
}

/// Sorted member names of a zip archive.
pub fn zip_members(path: &Path) -> Vec<String> {
    let archive =
        zip::ZipArchive::new(std::fs::File::open(path).expect("open archive")).expect("zip");
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

/// Raw bytes of one zip member.
pub fn zip_member_bytes(path: &Path, member: &str) -> Vec<u8> {
    let mut archive =
        zip::ZipArchive::new(std::fs::File::open(path).expect("open archive")).expect("zip");
    let mut entry = archive.by_name(member).expect("member");
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).expect("read member");
    bytes
}
