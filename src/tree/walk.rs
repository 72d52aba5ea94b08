use crate::backend::{DocumentBackend, LayerKind};
use crate::foundation::error::ExportResult;
use crate::foundation::progress::Stage;
use crate::output::report::IssueKind;
use crate::session::RunContext;
use crate::tags::{NodeRole, TagKind};
use crate::tree::arena::{LayerTree, NodeId};

/// A leaf (or merge group) retained for export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedLayer {
    pub node: NodeId,
    /// `[overlay]` layers above it in its subtree, outermost first.
    pub overlays: Vec<NodeId>,
    /// Visibility before the walk touched it.
    pub was_visible: bool,
}

enum Visit {
    Skip,
    Descend,
    Overlay,
    Collect { was_visible: bool },
}

struct Frame {
    children: Vec<NodeId>,
    next: usize,
    overlays: Vec<NodeId>,
}

/// Walk the tree top to bottom and return the exportable layers in walk order.
///
/// Every retained layer, and every layer excluded by filtering, is left hidden; overlays are
/// hidden and unlocked for later compositing.
#[tracing::instrument(skip_all)]
pub(crate) fn collect_layers<B: DocumentBackend + ?Sized>(
    tree: &mut LayerTree,
    backend: &mut B,
    ctx: &mut RunContext<'_>,
) -> ExportResult<Vec<CollectedLayer>> {
    ctx.progress.begin(Stage::Collect, tree.len());

    let mut out = Vec::new();
    let mut stack = vec![Frame {
        children: tree.roots().to_vec(),
        next: 0,
        overlays: Vec::new(),
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(&id) = frame.children.get(frame.next) else {
            stack.pop();
            continue;
        };
        frame.next += 1;
        ctx.step(&tree.node(id).name)?;

        match visit(tree, backend, ctx, id)? {
            Visit::Skip => {}
            Visit::Overlay => frame.overlays.push(id),
            Visit::Collect { was_visible } => {
                tree.hide(backend, id)?;
                out.push(CollectedLayer {
                    node: id,
                    overlays: frame.overlays.clone(),
                    was_visible,
                });
            }
            Visit::Descend => {
                let overlays = frame.overlays.clone();
                stack.push(Frame {
                    children: tree.node(id).children.clone(),
                    next: 0,
                    overlays,
                });
            }
        }
    }

    ctx.progress.finish();
    tracing::info!(collected = out.len(), "collected layers");
    Ok(out)
}

fn visit<B: DocumentBackend + ?Sized>(
    tree: &mut LayerTree,
    backend: &mut B,
    ctx: &mut RunContext<'_>,
    id: NodeId,
) -> ExportResult<Visit> {
    let settings = ctx.settings;
    let node = tree.node(id);
    let is_group = node.role == NodeRole::Group;

    if settings.selection_only && !node.selected {
        let needs_merge = is_group && tree.find_tag(id, TagKind::Merge).is_some();
        if !needs_merge && !node.children.is_empty() {
            return Ok(Visit::Descend);
        }
        tree.hide(backend, id)?;
        return Ok(Visit::Skip);
    }

    if settings.ignore_hidden_layers && !node.visible {
        return Ok(Visit::Skip);
    }
    if (settings.ignore_background && node.background)
        || tree.find_tag(id, TagKind::Ignore).is_some()
    {
        tree.hide(backend, id)?;
        return Ok(Visit::Skip);
    }
    if node.kind == LayerKind::Adjustment || node.clipping {
        return Ok(Visit::Skip);
    }
    if !is_group
        && node.kind != LayerKind::Pixel
        && tree.rasterize(backend, id)? != LayerKind::Pixel
    {
        tracing::debug!(layer = %tree.node(id).name, "dropping layer that cannot be rasterized");
        tree.hide(backend, id)?;
        return Ok(Visit::Skip);
    }

    let node = tree.node(id);
    if let Err(violation) = node.tags.check(node.role) {
        ctx.issues
            .push(IssueKind::InvalidTag, violation.describe(&node.name));
        return Ok(Visit::Skip);
    }

    if !is_group && node.tags.has(TagKind::Overlay) {
        if !node.visible {
            return Ok(Visit::Skip);
        }
        tree.unlock(backend, id)?;
        tree.hide(backend, id)?;
        return Ok(Visit::Overlay);
    }

    let was_visible = node.visible;
    tree.show(backend, id)?;
    tree.unlock(backend, id)?;

    let node = tree.node(id);
    if is_group && node.tags.has(TagKind::Merge) {
        hide_ignored_descendants(tree, backend, ctx, id)?;
        if tree.node(id).children.is_empty() {
            return Ok(Visit::Skip);
        }
        return Ok(Visit::Collect { was_visible });
    }
    if !node.children.is_empty() {
        return Ok(Visit::Descend);
    }
    if is_group {
        return Ok(Visit::Skip);
    }
    Ok(Visit::Collect { was_visible })
}

/// Hide `[ignore]`d nodes below a merge group so they stay out of the flattened image.
fn hide_ignored_descendants<B: DocumentBackend + ?Sized>(
    tree: &mut LayerTree,
    backend: &mut B,
    ctx: &RunContext<'_>,
    group: NodeId,
) -> ExportResult<()> {
    let mut pending = tree.node(group).children.clone();
    while let Some(id) = pending.pop() {
        let node = tree.node(id);
        if ctx.settings.ignore_hidden_layers && !node.visible {
            continue;
        }
        if tree.find_tag(id, TagKind::Ignore).is_some() {
            tree.hide(backend, id)?;
            continue;
        }
        pending.extend(node.children.iter().copied());
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/tree/walk.rs"]
mod tests;
