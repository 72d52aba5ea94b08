//! One export run: host preparation, the resolution passes, image and JSON output.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::backend::{ColorMode, DocumentBackend, with_checkpoint};
use crate::export::driver::export_attachments;
use crate::export::geometry::Placement;
use crate::foundation::cancel::CancelToken;
use crate::foundation::core::LayerId;
use crate::foundation::error::{ExportError, ExportResult};
use crate::foundation::progress::{Progress, ProgressObserver};
use crate::output::json;
use crate::output::report::{ErrorReport, IssueLog};
use crate::settings::{OutputPaths, Settings};
use crate::skeleton::model::Skeleton;
use crate::skeleton::resolve::resolve_skeleton;
use crate::skeleton::validate::validate;
use crate::tree::walk::collect_layers;
use crate::tree::LayerTree;

/// File name of the full-canvas reference image.
pub const TEMPLATE_FILE: &str = "template.png";

/// State threaded through every stage of a run.
pub(crate) struct RunContext<'a> {
    pub(crate) settings: &'a Settings,
    pub(crate) issues: IssueLog,
    pub(crate) progress: Progress<'a>,
    cancel: CancelToken,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        settings: &'a Settings,
        cancel: CancelToken,
        observer: Option<&'a mut dyn ProgressObserver>,
    ) -> Self {
        Self {
            settings,
            issues: IssueLog::default(),
            progress: Progress::new(observer),
            cancel,
        }
    }

    /// Report progress on `label`, then poll for cancellation.
    pub(crate) fn step(&mut self, label: &str) -> ExportResult<()> {
        self.progress.advance(label);
        self.check_cancel()
    }

    pub(crate) fn check_cancel(&self) -> ExportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }
}

/// What a successful run produced.
///
/// A check-only run counts every resolved slot and layer, since no bounds are measured.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportSummary {
    /// Bones besides the root.
    pub bones: usize,
    /// Slots with at least one attachment.
    pub slots: usize,
    pub attachments: usize,
    /// Image files written, absolute.
    pub images: Vec<PathBuf>,
    pub json_path: Option<PathBuf>,
    /// The skeleton document, when JSON output is enabled.
    pub json: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed(ExportSummary),
    /// Per-item problems were found; nothing was written besides the error log.
    Rejected(ErrorReport),
    Cancelled,
}

/// Configures and runs one export against a [`DocumentBackend`].
pub struct Exporter<'a> {
    settings: Settings,
    cancel: CancelToken,
    progress: Option<&'a mut dyn ProgressObserver>,
    check_only: bool,
}

impl<'a> Exporter<'a> {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            cancel: CancelToken::new(),
            progress: None,
            check_only: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, observer: &'a mut dyn ProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Stop after validation: report issues without writing images or JSON.
    pub fn check_only(mut self, check_only: bool) -> Self {
        self.check_only = check_only;
        self
    }

    /// Run the export. The document is returned to its prior state whatever the outcome.
    #[tracing::instrument(skip_all)]
    pub fn run<B: DocumentBackend + ?Sized>(self, backend: &mut B) -> ExportResult<RunOutcome> {
        let Self {
            settings,
            cancel,
            progress,
            check_only,
        } = self;
        settings.validate()?;

        let info = backend.info()?;
        let selection = if settings.selection_only {
            let selected = backend.selected_layers()?;
            if selected.is_empty() {
                return Err(ExportError::validation(
                    "selection only export requires at least one selected layer",
                ));
            }
            Some(selected)
        } else {
            None
        };
        let paths = settings.output_paths(&info.folder, &info.name);
        tracing::info!(document = %info.name, "starting export");

        let mut ctx = RunContext::new(
            &settings,
            cancel,
            progress.map(|p| p as &mut dyn ProgressObserver),
        );
        let staging = match (&paths.images_dir, check_only) {
            (Some(dir), false) => Some(staging_dir(dir)?),
            _ => None,
        };

        let checkpoint = backend.checkpoint()?;
        let result = produce(
            backend,
            &mut ctx,
            &paths,
            selection.as_deref(),
            staging.as_ref().map(tempfile::TempDir::path),
            check_only,
        );
        backend.restore(checkpoint)?;

        let produced = match result {
            Ok(p) => p,
            Err(ExportError::Cancelled) => {
                tracing::info!("export cancelled");
                return Ok(RunOutcome::Cancelled);
            }
            Err(e) => return Err(e),
        };

        let (skeleton, images) = match produced {
            Produced::Rejected(report) => return Ok(RunOutcome::Rejected(report)),
            Produced::Skipped => (Skeleton::default(), Vec::new()),
            Produced::Skeleton(skeleton, images) => (*skeleton, images),
        };

        let mut summary = ExportSummary {
            bones: skeleton.bones.len() - 1,
            slots: skeleton.exported_slot_count(),
            attachments: skeleton.attachment_count(),
            ..ExportSummary::default()
        };
        if check_only {
            summary.slots = skeleton.slots.len();
            summary.attachments = skeleton.layers.len();
            return Ok(RunOutcome::Completed(summary));
        }

        let text = match &paths.json_file {
            None => None,
            Some(_) => {
                let images_dir = paths.images_dir.as_deref();
                match json::skeleton_value(&skeleton, &settings, images_dir, &ctx) {
                    Ok(value) => Some(json::render(&value)?),
                    Err(ExportError::Cancelled) => {
                        tracing::info!("export cancelled");
                        return Ok(RunOutcome::Cancelled);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        if let (Some(dir), Some(staged)) = (&paths.images_dir, &staging) {
            summary.images = commit_images(staged.path(), dir, &images)?;
        }
        if let (Some(file), Some(text)) = (&paths.json_file, text) {
            write_json(file, &text)?;
            summary.json_path = Some(file.clone());
            summary.json = Some(text);
        }

        tracing::info!(
            bones = summary.bones,
            slots = summary.slots,
            attachments = summary.attachments,
            "export finished"
        );
        Ok(RunOutcome::Completed(summary))
    }
}

enum Produced {
    /// No outputs configured besides the template.
    Skipped,
    Rejected(ErrorReport),
    Skeleton(Box<Skeleton>, Vec<PathBuf>),
}

fn produce<B: DocumentBackend + ?Sized>(
    backend: &mut B,
    ctx: &mut RunContext<'_>,
    paths: &OutputPaths,
    selection: Option<&[LayerId]>,
    staging: Option<&Path>,
    check_only: bool,
) -> ExportResult<Produced> {
    let settings = ctx.settings;
    backend.deselect_all()?;
    backend.convert_to_rgb()?;
    let info = backend.info()?;
    if info.color_mode != ColorMode::Rgb {
        return Err(ExportError::backend(format!(
            "document colour mode must be RGB, found {:?}",
            info.color_mode
        )));
    }
    let placement = Placement::new(settings, &info);

    if settings.write_template
        && let Some(dir) = staging
    {
        with_checkpoint(backend, |b| {
            if settings.scale != 1.0 {
                b.resize_image(settings.scale)?;
            }
            b.save_png(&dir.join(TEMPLATE_FILE))
        })?;
    }
    if !settings.has_outputs() {
        return Ok(Produced::Skipped);
    }

    if let Err(e) = backend.rasterize_all() {
        tracing::warn!("rasterizing all layers failed, continuing per layer: {e}");
    }

    let mut tree = LayerTree::build(backend, selection)?;
    let collected = collect_layers(&mut tree, backend, ctx)?;
    let mut skeleton = resolve_skeleton(&mut tree, backend, &collected, ctx, placement)?;
    validate(&mut skeleton, &mut ctx.issues);

    if !ctx.issues.is_empty() {
        let issues = std::mem::take(&mut ctx.issues).into_vec();
        tracing::info!(issues = issues.len(), "export rejected");
        let mut report = ErrorReport::new(issues);
        report.write_log(&paths.error_log);
        return Ok(Produced::Rejected(report));
    }
    if check_only {
        return Ok(Produced::Skeleton(Box::new(skeleton), Vec::new()));
    }

    let images = export_attachments(&mut skeleton, &mut tree, backend, ctx, placement, staging)?;
    Ok(Produced::Skeleton(Box::new(skeleton), images))
}

fn staging_dir(images_dir: &Path) -> ExportResult<tempfile::TempDir> {
    std::fs::create_dir_all(images_dir)
        .with_context(|| format!("create images folder '{}'", images_dir.display()))?;
    let dir = tempfile::Builder::new()
        .prefix(".layer2spine-")
        .tempdir_in(images_dir)
        .with_context(|| format!("create staging folder in '{}'", images_dir.display()))?;
    Ok(dir)
}

/// Move staged images into `images_dir`, replacing existing files.
fn commit_images(
    staging: &Path,
    images_dir: &Path,
    relative: &[PathBuf],
) -> ExportResult<Vec<PathBuf>> {
    let mut out = Vec::with_capacity(relative.len() + 1);
    let mut all: Vec<&Path> = relative.iter().map(PathBuf::as_path).collect();
    let template = Path::new(TEMPLATE_FILE);
    if staging.join(template).exists() {
        all.push(template);
    }
    for rel in all {
        let from = staging.join(rel);
        let to = images_dir.join(rel);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create folder '{}'", parent.display()))?;
        }
        std::fs::rename(&from, &to)
            .with_context(|| format!("move image into '{}'", to.display()))?;
        out.push(to);
    }
    Ok(out)
}

fn write_json(path: &Path, text: &str) -> ExportResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create folder '{}'", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("write JSON '{}'", path.display()))?;
    Ok(())
}
