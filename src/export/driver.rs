use std::path::{Path, PathBuf};

use crate::backend::{DocumentBackend, with_checkpoint};
use crate::export::geometry::{ImagePlan, Placement, attachment_frame};
use crate::foundation::core::is_degenerate;
use crate::foundation::error::ExportResult;
use crate::foundation::progress::Stage;
use crate::session::RunContext;
use crate::skeleton::model::{MeshLink, Skeleton};
use crate::tags::NodeRole;
use crate::tree::LayerTree;

/// Render every resolved layer and record its attachment geometry.
///
/// With `staging`, each image is written there at `<attachment path>.png`; the returned paths
/// are relative to `staging`, without duplicates. Layers with empty bounds get no geometry.
#[tracing::instrument(skip_all)]
pub(crate) fn export_attachments<B: DocumentBackend + ?Sized>(
    skeleton: &mut Skeleton,
    tree: &mut LayerTree,
    backend: &mut B,
    ctx: &mut RunContext<'_>,
    placement: Placement,
    staging: Option<&Path>,
) -> ExportResult<Vec<PathBuf>> {
    let order: Vec<usize> = skeleton
        .skins
        .values()
        .flat_map(|skin| skin.slots.values())
        .flat_map(|layers| layers.iter().rev().copied())
        .collect();
    let total = order.len();
    ctx.progress.begin(Stage::Export, total);

    let mut written = Vec::new();
    for (n, index) in order.into_iter().enumerate() {
        let layer = &skeleton.layers[index];
        let node = layer.node;
        tree.show(backend, node)?;
        ctx.step(&tree.node(node).name)?;

        if tree.node(node).role == NodeRole::Group {
            tree.flatten(backend, node)?;
        }
        backend.rasterize_styles(tree.node(node).layer)?;
        tree.invalidate_bounds(node);

        let target = tree.node(node).layer;
        for &overlay in &layer.overlays {
            let overlay_layer = tree.node(overlay).layer;
            backend.move_above(overlay_layer, target)?;
            backend.set_clipping_mask(overlay_layer, true)?;
            tree.show(backend, overlay)?;
        }

        let measured = match &layer.mesh {
            MeshLink::Linked {
                source: Some(source),
                ..
            } => skeleton.layers[*source].node,
            _ => node,
        };
        let bounds = tree.bounds(backend, measured)?;
        if is_degenerate(bounds) {
            tracing::debug!(layer = %layer.path, "skipping layer without pixels");
            tree.hide(backend, node)?;
            continue;
        }

        let trim = layer.trim.unwrap_or(ctx.settings.trim_whitespace);
        let bone = skeleton
            .slots
            .get(&layer.slot_name)
            .and_then(|slot| slot.bone)
            .map(|b| skeleton.bones.document_position(b));
        let (geometry, plan) = attachment_frame(
            bounds,
            trim,
            layer.scale,
            layer.mesh.is_mesh(),
            placement,
            bone,
        );

        if let Some(dir) = staging {
            let relative = PathBuf::from(format!("{}.png", layer.attachment_path));
            save_image(backend, &plan, &dir.join(&relative))?;
            if !written.contains(&relative) {
                written.push(relative);
            }
        }

        if n + 1 < total {
            tree.hide(backend, node)?;
        }
        let slot_name = layer.slot_name.clone();
        if let Some(slot) = skeleton.slots.get_mut(&slot_name) {
            slot.has_attachments = true;
        }
        skeleton.layers[index].geometry = Some(geometry);
    }

    ctx.progress.finish();
    tracing::info!(
        attachments = skeleton.attachment_count(),
        images = written.len(),
        "exported attachments"
    );
    Ok(written)
}

fn save_image<B: DocumentBackend + ?Sized>(
    backend: &mut B,
    plan: &ImagePlan,
    path: &Path,
) -> ExportResult<()> {
    with_checkpoint(backend, |b| {
        if let Some(region) = plan.crop {
            b.crop(region)?;
        }
        if plan.resize != 1.0 {
            b.resize_image(plan.resize)?;
        }
        if let Some((width, height)) = plan.canvas {
            b.resize_canvas(width, height)?;
        }
        b.save_png(path)
    })
}

#[cfg(test)]
#[path = "../../tests/unit/export/driver.rs"]
mod tests;
