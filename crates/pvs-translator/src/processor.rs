//! Conversion processor: the stage pipeline of one job.
//!
//! `descriptor → [view refresh] → primary conversion (2D or 3D) →
//! [additional formats → packaging] → [loader options]`. Every stage error
//! becomes a single status line; stages after a failure are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::archive::{ArchivePackager, PackEntry};
use crate::config::Settings;
use crate::descriptor::JobDescriptor;
use crate::error::ConversionError;
use crate::executor::{ToolExecutor, ToolInvocation, ToolResult};
use crate::filesystem::FsUtils;
use crate::formats::{FormatRegistry, IntermediateFormat};
use crate::metrics::{ConversionMetrics, MetricsSnapshot};
use crate::models::{JobOutcome, StageOutcome};
use crate::reconciler::{Discovery, OutputReconciler};
use crate::sidecar;
use crate::status::StatusFile;
use crate::tools::ToolPaths;

/// Bundle of additional-format deliverables.
pub const ADDITIONALS_ARCHIVE: &str = "additionals.pvoa";

/// The main conversion processor.
#[derive(Debug, Clone)]
pub struct ConversionProcessor {
    settings: Settings,
    tools: ToolPaths,
    registry: FormatRegistry,
    executor: ToolExecutor,
    metrics: Arc<ConversionMetrics>,
}

impl ConversionProcessor {
    /// Create a processor, resolving tool locations from the settings.
    pub fn new(settings: Settings) -> Self {
        let tools = ToolPaths::resolve(&settings.tools);
        Self::with_tools(settings, tools)
    }

    /// Create a processor with already-resolved tools.
    pub fn with_tools(settings: Settings, tools: ToolPaths) -> Self {
        let metrics = Arc::new(ConversionMetrics::new());
        Self {
            executor: ToolExecutor::new(settings.timeout_tolerated_exit_code, Arc::clone(&metrics)),
            registry: FormatRegistry::standard(),
            metrics,
            tools,
            settings,
        }
    }

    /// Get the configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the resolved tools.
    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Get a metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolve the control file and run the job, recording the outcome in
    /// `status`.
    ///
    /// Errors resolving the descriptor are returned to the caller; every
    /// later failure is written to the status file and reported as
    /// [`JobOutcome::Failed`].
    #[instrument(skip(self, status), fields(control_file = %control_file.display()))]
    pub async fn execute_job(
        &self,
        control_file: &Path,
        status: &StatusFile,
    ) -> Result<JobOutcome, ConversionError> {
        let descriptor = JobDescriptor::from_control_file(control_file).await?;
        debug!(%descriptor, "Created translation info");
        self.run(&descriptor, status).await
    }

    /// Run the stage pipeline for a resolved descriptor.
    #[instrument(skip_all, fields(file = %descriptor.file_name(), file_type = %descriptor.file_type()))]
    pub async fn run(
        &self,
        descriptor: &JobDescriptor,
        status: &StatusFile,
    ) -> Result<JobOutcome, ConversionError> {
        let outcome = self.run_stages(descriptor).await;

        match &outcome {
            JobOutcome::Succeeded { result, .. } => status.write_success(result).await?,
            JobOutcome::Failed { message } => status.write_failure(message).await?,
        }

        let snapshot = self.metrics.snapshot();
        info!(
            metrics = %serde_json::to_string(&snapshot).unwrap_or_default(),
            success = outcome.is_success(),
            "Job finished"
        );

        Ok(outcome)
    }

    async fn run_stages(&self, descriptor: &JobDescriptor) -> JobOutcome {
        if let Err(e) = tokio::fs::create_dir_all(descriptor.output_dir()).await {
            return JobOutcome::Failed {
                message: ConversionError::Io(e).to_string(),
            };
        }

        if descriptor.is_drawing() && self.settings.refresh_draft_view {
            self.refresh_views(descriptor).await;
        }

        let primary: StageOutcome = if descriptor.is_drawing() {
            self.convert_2d(descriptor).await.into()
        } else {
            self.convert_3d(descriptor).await.into()
        };
        let result = match primary {
            StageOutcome::Succeeded(path) => path,
            StageOutcome::Failed(message) => return JobOutcome::Failed { message },
        };

        let mut additionals = None;
        if !descriptor.additional_formats().is_empty() {
            match self.package_additionals(descriptor).await {
                Ok(archive) => additionals = archive,
                Err(e) => {
                    return JobOutcome::Failed {
                        message: e.to_string(),
                    };
                }
            }
        }

        if self.settings.generate_thumbnail {
            if let Err(e) = sidecar::write_loader_options(descriptor.output_dir()).await {
                return JobOutcome::Failed {
                    message: e.to_string(),
                };
            }
        }

        JobOutcome::Succeeded {
            result,
            additionals,
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Refresh drawing views in place. Never fails the job.
    async fn refresh_views(&self, descriptor: &JobDescriptor) {
        let source = descriptor.source_path();
        let invocation = ToolInvocation::new(
            &self.tools.update_views,
            vec![source.to_string_lossy().into_owned()],
            self.settings.refresh_timeout(),
        )
        .expecting(&source)
        .with_pid_file(descriptor.pid_file_path());

        match self.executor.run(&invocation).await {
            Ok(result) => info!(
                success = result.success,
                exit_code = result.exit_code,
                "View refresh finished"
            ),
            Err(e) => warn!(error = %e, "View refresh could not run, continuing"),
        }
    }

    /// 3D branch: translate to the intermediate format, then to PVS.
    async fn convert_3d(&self, descriptor: &JobDescriptor) -> Result<PathBuf, ConversionError> {
        let configured = self.settings.intermediate_format.as_str();
        let format = IntermediateFormat::parse_intermediate(configured)?;
        let ext = self.registry.extension_for(format)?;

        let intermediate = self
            .translate(descriptor, format, descriptor.output_path(ext))
            .await?;
        let Some(intermediate_path) = intermediate.output().map(Path::to_path_buf) else {
            return Err(intermediate_failure(configured, &intermediate));
        };
        FsUtils::delete_logs(descriptor.output_dir()).await;

        let converter = self.tools.pvs_converter(format);
        let invocation = ToolInvocation::new(
            converter,
            vec![
                "-p".to_string(),
                descriptor.output_dir().to_string_lossy().into_owned(),
                intermediate_path.to_string_lossy().into_owned(),
            ],
            self.settings.pvs_timeout(),
        );
        let mut pvs = self.executor.run(&invocation).await?;
        let found = FsUtils::find_pvs(descriptor.output_dir(), |_| true).await?;
        pvs.resolve_output(found, descriptor.output_path("pvs"));

        match pvs.output() {
            Some(path) => Ok(path.to_path_buf()),
            None => Err(stage_failure(
                converter.label,
                &pvs,
                format!(
                    "PVS file generation failed, failed to generate pvs from {}. Process returned exit code {}: {}{}",
                    configured, pvs.exit_code, pvs.stdout, pvs.stderr
                ),
            )),
        }
    }

    /// 2D branch: translate to PDF, wrap it in an ASCII PVS, convert that
    /// to binary.
    async fn convert_2d(&self, descriptor: &JobDescriptor) -> Result<PathBuf, ConversionError> {
        let pdf = self
            .translate(
                descriptor,
                IntermediateFormat::Pdf,
                descriptor.output_path(IntermediateFormat::Pdf.canonical_extension()),
            )
            .await?;
        let Some(pdf_path) = pdf.output().map(Path::to_path_buf) else {
            return Err(intermediate_failure("pdf", &pdf));
        };
        FsUtils::delete_logs(descriptor.output_dir()).await;

        let ascii = sidecar::write_ascii_pvs(descriptor, &pdf_path).await?;

        let invocation = ToolInvocation::new(
            &self.tools.pvs_change,
            vec![
                "-Dradapter/outputAsciiED".to_string(),
                "0".to_string(),
                "-p".to_string(),
                descriptor.output_dir().to_string_lossy().into_owned(),
                "-o".to_string(),
                format!("{}.pvs", descriptor.file_name()),
                ascii.to_string_lossy().into_owned(),
            ],
            self.settings.pvs_timeout(),
        );
        let mut binary = self.executor.run(&invocation).await?;
        let found = FsUtils::find_pvs(descriptor.output_dir(), |name| {
            !name.contains(sidecar::ASCII_PVS_MARKER)
        })
        .await?;
        binary.resolve_output(found, descriptor.output_path("pvs"));

        let Some(result) = binary.output().map(Path::to_path_buf) else {
            return Err(stage_failure(
                self.tools.pvs_change.label,
                &binary,
                format!(
                    "PVS file generation failed, failed to convert pvs to binary. Process returned exit code {}: {}{}",
                    binary.exit_code, binary.stdout, binary.stderr
                ),
            ));
        };

        if let Err(e) = tokio::fs::remove_file(&ascii).await {
            warn!(path = %ascii.display(), error = %e, "Failed to delete ASCII PVS");
        }
        Ok(result)
    }

    /// Produce every additional format and bundle them into
    /// `additionals.pvoa`; `None` when nothing was produced.
    async fn package_additionals(
        &self,
        descriptor: &JobDescriptor,
    ) -> Result<Option<PathBuf>, ConversionError> {
        let created = self.additional_formats(descriptor).await?;
        debug!(files = ?created, "List of generated additional files");

        if created.is_empty() {
            info!("No additional files to package");
            return Ok(None);
        }

        let entries: Vec<PackEntry> = created
            .iter()
            .map(|path| PackEntry::moved(path, FsUtils::extract_filename_str(path)))
            .collect();
        let archive = ArchivePackager::new(descriptor.output_dir())
            .pack(&entries, ADDITIONALS_ARCHIVE)
            .await?;
        self.metrics.record_archive(entries.len());
        Ok(Some(archive))
    }

    /// Reuse, reconcile or generate each requested additional format.
    async fn additional_formats(
        &self,
        descriptor: &JobDescriptor,
    ) -> Result<Vec<PathBuf>, ConversionError> {
        let reconciler = OutputReconciler::new(descriptor);
        let packager = ArchivePackager::new(descriptor.output_dir());
        let mut created = Vec::new();

        for ext in descriptor.additional_formats() {
            let target = descriptor.output_dir().join(reconciler.target_name(ext));

            match reconciler.discover(ext).await? {
                Discovery::Single(existing) => {
                    if existing != target {
                        tokio::fs::copy(&existing, &target).await?;
                    }
                    debug!(ext = %ext, from = %existing.display(), "Reusing existing file");
                    self.metrics.record_format_reused();
                    created.push(target);
                    continue;
                }
                Discovery::Multiple(files) => {
                    created.push(self.group(descriptor, &reconciler, &packager, ext, files).await?);
                    self.metrics.record_format_reused();
                    continue;
                }
                Discovery::None => {}
            }

            let format = match self.registry.format_for(ext) {
                Ok(format) => format,
                Err(_) => {
                    warn!(ext = %ext, "Given additional format is not supported, skipping");
                    self.metrics.record_format_skipped();
                    continue;
                }
            };

            let run = self.translate(descriptor, format, target).await?;

            match reconciler.discover(ext).await? {
                Discovery::None => {
                    return Err(stage_failure(
                        self.tools.translation_services.label,
                        &run,
                        format!(
                            "Additional file generation failed, failed to generate {}. Process returned exit code {}: {}{}",
                            ext, run.exit_code, run.stderr, run.job_log
                        ),
                    ));
                }
                Discovery::Single(path) => created.push(path),
                Discovery::Multiple(files) => {
                    created.push(self.group(descriptor, &reconciler, &packager, ext, files).await?);
                }
            }
            self.metrics.record_format_generated();

            FsUtils::delete_logs(descriptor.output_dir()).await;
        }

        Ok(created)
    }

    /// Bundle several files of one extension, keeping a drawing's own PDF
    /// in place.
    async fn group(
        &self,
        descriptor: &JobDescriptor,
        reconciler: &OutputReconciler,
        packager: &ArchivePackager,
        ext: &str,
        files: Vec<PathBuf>,
    ) -> Result<PathBuf, ConversionError> {
        let primary_pdf = descriptor
            .is_drawing()
            .then(|| descriptor.output_path(IntermediateFormat::Pdf.canonical_extension()));
        let count = files.len();
        let archive = reconciler
            .group(ext, files, packager, primary_pdf.as_deref())
            .await?;
        self.metrics.record_archive(count);
        Ok(archive)
    }

    /// Run the translation service from the source file to `output`.
    async fn translate(
        &self,
        descriptor: &JobDescriptor,
        format: IntermediateFormat,
        output: PathBuf,
    ) -> Result<ToolResult, ConversionError> {
        let ext = self.registry.extension_for(format)?;
        debug!(
            input = %descriptor.source_path().display(),
            output = %output.display(),
            format = %format,
            "Starting translation"
        );

        let invocation = ToolInvocation::new(
            &self.tools.translation_services,
            vec![
                format!("-i={}", descriptor.source_path().display()),
                format!("-o={}", output.display()),
                format!("-t={ext}"),
            ],
            self.settings.conversion_timeout(descriptor.source_kind()),
        )
        .expecting(output)
        .with_job_log(descriptor.tool_log_path());

        self.executor.run(&invocation).await
    }
}

fn intermediate_failure(format: &str, result: &ToolResult) -> ConversionError {
    stage_failure(
        "translation service",
        result,
        format!(
            "Intermediate file generation failed, failed to generate {}. Process returned exit code {}: {}{}",
            format, result.exit_code, result.stderr, result.job_log
        ),
    )
}

/// `OutputMissing` when the tool exited cleanly without its result file,
/// `ToolFailed` otherwise.
fn stage_failure(tool: &str, result: &ToolResult, message: String) -> ConversionError {
    match &result.result_file {
        Some(path) if result.exit_code == 0 && !result.timed_out => {
            ConversionError::OutputMissing {
                tool: tool.to_string(),
                path: path.clone(),
                message,
            }
        }
        _ => ConversionError::ToolFailed {
            tool: tool.to_string(),
            message,
        },
    }
}
