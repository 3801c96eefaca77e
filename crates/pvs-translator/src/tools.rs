//! External tool discovery.
//!
//! Locates the five executables the pipeline drives:
//! 1. Explicit per-tool paths from configuration
//! 2. The translation service under its configured install home
//! 3. Helper tools in the bundle directory (`<binary dir>/../bin` by default)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ToolSettings;
use crate::formats::IntermediateFormat;

/// Translation service, relative to the install home.
const TRANSLATION_SERVICES: &str = "Program/SolidEdgeTranslationServices.exe";

/// View refresh helper, relative to the bundle directory.
const UPDATE_VIEWS: &str = "SolidEdgeUpdateViews.exe";

/// STEP → PVS converter, relative to the bundle directory.
const STEP_TO_PVS: &str = "STEP2PV/stepbatch.bat";

/// JT → PVS converter, relative to the bundle directory.
const JT_TO_PVS: &str = "JT2PV/jtbatch.bat";

/// ASCII → binary PVS converter, relative to the bundle directory.
const PVS_CHANGE: &str = "PVSCHANGE/pvschangebatch.bat";

/// How a tool path was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// Explicitly configured.
    ExplicitConfig,
    /// Derived from the translation service install home.
    InstallHome,
    /// Derived from the bundle directory.
    Bundle,
}

/// One resolved tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolLocation {
    /// Label used in logs and errors.
    pub label: &'static str,
    /// Executable path.
    pub path: PathBuf,
    /// How the path was determined.
    pub source: ToolSource,
}

impl ToolLocation {
    /// Whether the executable exists on disk.
    pub fn is_present(&self) -> bool {
        self.path.is_file()
    }
}

/// Every tool the pipeline may invoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolPaths {
    /// CAD translation service (primary conversion).
    pub translation_services: ToolLocation,
    /// Drawing view refresh helper.
    pub update_views: ToolLocation,
    /// STEP → PVS converter.
    pub step_to_pvs: ToolLocation,
    /// JT → PVS converter.
    pub jt_to_pvs: ToolLocation,
    /// ASCII → binary PVS converter.
    pub pvs_change: ToolLocation,
}

impl ToolPaths {
    /// Resolve tool paths from configuration.
    pub fn resolve(settings: &ToolSettings) -> Self {
        let bundle_dir = settings
            .bundle_dir
            .clone()
            .unwrap_or_else(default_bundle_dir);
        debug!(bundle_dir = %bundle_dir.display(), "Resolving external tools");

        let paths = Self {
            translation_services: pick(
                "translation service",
                settings.translation_services.as_deref(),
                &settings.install_home,
                TRANSLATION_SERVICES,
                ToolSource::InstallHome,
            ),
            update_views: pick(
                "view refresh",
                settings.update_views.as_deref(),
                &bundle_dir,
                UPDATE_VIEWS,
                ToolSource::Bundle,
            ),
            step_to_pvs: pick(
                "STEP to PVS converter",
                settings.step_to_pvs.as_deref(),
                &bundle_dir,
                STEP_TO_PVS,
                ToolSource::Bundle,
            ),
            jt_to_pvs: pick(
                "JT to PVS converter",
                settings.jt_to_pvs.as_deref(),
                &bundle_dir,
                JT_TO_PVS,
                ToolSource::Bundle,
            ),
            pvs_change: pick(
                "PVS binary converter",
                settings.pvs_change.as_deref(),
                &bundle_dir,
                PVS_CHANGE,
                ToolSource::Bundle,
            ),
        };

        for tool in paths.all() {
            info!(
                tool = tool.label,
                path = %tool.path.display(),
                source = ?tool.source,
                present = tool.is_present(),
                "External tool resolved"
            );
        }

        paths
    }

    /// PVS converter for an intermediate format (JT uses its own, everything else STEP's).
    pub fn pvs_converter(&self, format: IntermediateFormat) -> &ToolLocation {
        match format {
            IntermediateFormat::Jt => &self.jt_to_pvs,
            _ => &self.step_to_pvs,
        }
    }

    /// All tools, for diagnostics.
    pub fn all(&self) -> [&ToolLocation; 5] {
        [
            &self.translation_services,
            &self.update_views,
            &self.step_to_pvs,
            &self.jt_to_pvs,
            &self.pvs_change,
        ]
    }
}

fn pick(
    label: &'static str,
    explicit: Option<&Path>,
    base: &Path,
    relative: &str,
    derived: ToolSource,
) -> ToolLocation {
    match explicit {
        Some(path) if !path.as_os_str().is_empty() => ToolLocation {
            label,
            path: path.to_path_buf(),
            source: ToolSource::ExplicitConfig,
        },
        _ => ToolLocation {
            label,
            path: relative.split('/').fold(base.to_path_buf(), |p, s| p.join(s)),
            source: derived,
        },
    }
}

/// `<directory above the running binary>/bin`.
fn default_bundle_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(Path::parent).map(|p| p.join("bin")))
        .unwrap_or_else(|| PathBuf::from("bin"))
}
