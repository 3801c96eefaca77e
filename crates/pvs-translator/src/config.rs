//! Configuration for the translation pipeline.
//!
//! Settings come from serde defaults, an optional TOML file and
//! `CAD_PVS__`-prefixed environment variables, merged with the `config`
//! crate and range-checked with `validator`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::error::ConversionError;
use crate::models::SourceKind;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "CAD_PVS_CONFIG";

/// Prefix of environment overrides (`CAD_PVS__DEBUG=true`).
pub const ENV_PREFIX: &str = "CAD_PVS";

/// Configuration file looked up next to the binary.
pub const DEFAULT_CONFIG_FILE: &str = "cad-to-pvs.toml";

/// Top-level settings for one translation job.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Enable debug-level logging.
    pub debug: bool,

    /// Refresh drawing views before translating a `.dft`.
    pub refresh_draft_view: bool,

    /// Timeout for the view refresh helper.
    #[validate(range(min = 1, max = 86400))]
    pub refresh_view_timeout_seconds: u64,

    /// Translation timeout for assemblies.
    #[validate(range(min = 1, max = 86400))]
    pub convert_asm_timeout_seconds: u64,

    /// Translation timeout for drawings.
    #[validate(range(min = 1, max = 86400))]
    pub convert_dft_timeout_seconds: u64,

    /// Translation timeout for parts and unclassified types.
    #[validate(range(min = 1, max = 86400))]
    pub convert_part_timeout_seconds: u64,

    /// Timeout for the PVS conversion tools.
    #[validate(range(min = 1, max = 86400))]
    pub pvs_timeout_seconds: u64,

    /// Intermediate format of the 3D branch: `STEP`/`STP` or `JT`.
    pub intermediate_format: String,

    /// Write `loaderoptions.txt` requesting thumbnail creation.
    pub generate_thumbnail: bool,

    /// Exit code accepted as success when a tool had to be killed on timeout.
    pub timeout_tolerated_exit_code: i32,

    /// External tool locations.
    pub tools: ToolSettings,

    /// Logging output.
    pub logging: LoggingSettings,
}

/// Where the external tools live.
///
/// Unset paths are derived from `install_home` (translation service) or
/// `bundle_dir` (everything else).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Base install path of the CAD translation service.
    pub install_home: PathBuf,
    /// Directory of the bundled helper tools.
    pub bundle_dir: Option<PathBuf>,
    /// Explicit path of the translation service.
    pub translation_services: Option<PathBuf>,
    /// Explicit path of the drawing view refresh helper.
    pub update_views: Option<PathBuf>,
    /// Explicit path of the STEP → PVS converter.
    pub step_to_pvs: Option<PathBuf>,
    /// Explicit path of the JT → PVS converter.
    pub jt_to_pvs: Option<PathBuf>,
    /// Explicit path of the ASCII → binary PVS converter.
    pub pvs_change: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: `"trace"`, `"debug"`, `"info"`, `"warn"`, `"error"`.
    pub level: String,
    /// Log format: `"json"` or `"pretty"`.
    pub format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            refresh_draft_view: false,
            refresh_view_timeout_seconds: default_refresh_view_timeout_seconds(),
            convert_asm_timeout_seconds: default_convert_asm_timeout_seconds(),
            convert_dft_timeout_seconds: default_convert_dft_timeout_seconds(),
            convert_part_timeout_seconds: default_convert_part_timeout_seconds(),
            pvs_timeout_seconds: default_pvs_timeout_seconds(),
            intermediate_format: default_intermediate_format(),
            generate_thumbnail: false,
            timeout_tolerated_exit_code: default_timeout_tolerated_exit_code(),
            tools: ToolSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_refresh_view_timeout_seconds() -> u64 {
    600
}

fn default_convert_asm_timeout_seconds() -> u64 {
    3600
}

fn default_convert_dft_timeout_seconds() -> u64 {
    3600
}

fn default_convert_part_timeout_seconds() -> u64 {
    600
}

fn default_pvs_timeout_seconds() -> u64 {
    3600
}

fn default_intermediate_format() -> String {
    "STEP".to_string()
}

fn default_timeout_tolerated_exit_code() -> i32 {
    9998
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    /// Load settings from an optional file plus environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self, ConversionError> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            debug!(path = %file.display(), "Adding configuration file source");
            builder = builder.add_source(config::File::from(file).required(false));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Configuration file to load: `$CAD_PVS_CONFIG`, else next to the binary.
    pub fn default_config_file() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(explicit));
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_CONFIG_FILE)))
    }

    /// Translation timeout for a source kind.
    pub fn conversion_timeout(&self, kind: SourceKind) -> Duration {
        let seconds = match kind {
            SourceKind::Assembly => self.convert_asm_timeout_seconds,
            SourceKind::Drawing => self.convert_dft_timeout_seconds,
            SourceKind::Part => self.convert_part_timeout_seconds,
        };
        Duration::from_secs(seconds)
    }

    /// View refresh timeout.
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_view_timeout_seconds)
    }

    /// PVS conversion timeout.
    pub fn pvs_timeout(&self) -> Duration {
        Duration::from_secs(self.pvs_timeout_seconds)
    }

    /// Log filter directive, with `debug` forcing debug output.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.logging.level
        }
    }
}
