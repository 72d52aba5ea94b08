use crate::backend::{BlendMode, DocumentBackend};
use crate::export::geometry::{Placement, bone_anchor};
use crate::foundation::error::ExportResult;
use crate::output::report::IssueKind;
use crate::session::RunContext;
use crate::skeleton::bones::BoneId;
use crate::skeleton::model::{
    DEFAULT_SKIN, MeshLink, ResolvedLayer, Skeleton, Skin, Slot, SlotBlend,
};
use crate::tags::{TagKind, strip_tags};
use crate::tree::{CollectedLayer, LayerTree, NodeId};

const MAX_NAME_LEN: usize = 255;

/// Assign every collected layer to a bone, slot and skin.
///
/// Layers are processed in paint order (bottom first). Per-layer problems are recorded on the
/// run context and the layer is left out.
#[tracing::instrument(skip_all, fields(layers = collected.len()))]
pub(crate) fn resolve_skeleton<B: DocumentBackend + ?Sized>(
    tree: &mut LayerTree,
    backend: &B,
    collected: &[CollectedLayer],
    ctx: &mut RunContext<'_>,
    placement: Placement,
) -> ExportResult<Skeleton> {
    let mut skeleton = Skeleton::default();

    for layer in collected.iter().rev() {
        ctx.check_cancel()?;
        let Some((resolved, bone)) =
            resolve_layer(tree, backend, layer, ctx, placement, &mut skeleton)?
        else {
            continue;
        };
        register(tree, &mut skeleton, resolved, bone);
    }

    tracing::info!(
        bones = skeleton.bones.len() - 1,
        slots = skeleton.slots.len(),
        layers = skeleton.layers.len(),
        "resolved skeleton"
    );
    Ok(skeleton)
}

/// Attachment name from a layer's display name: tags and a `.png` suffix removed, characters
/// illegal in file names dropped.
pub fn sanitize_name(raw: &str) -> String {
    let stripped = strip_tags(raw);
    let base = stripped.strip_suffix(".png").unwrap_or(&stripped);
    let cleaned: String = base
        .chars()
        .filter(|c| !matches!(c, '\\' | ':' | '"' | '*' | '?' | '<' | '>' | '|'))
        .collect();
    if cleaned.chars().all(|c| c == '.') || cleaned == "__drag" {
        return String::new();
    }
    cleaned
}

/// Names Windows reserves for devices, with or without an extension.
pub fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_ascii_lowercase();
    match stem.as_str() {
        "con" | "prn" | "aux" | "nul" => true,
        s if s.len() == 4 && (s.starts_with("com") || s.starts_with("lpt")) => {
            s.as_bytes()[3].is_ascii_digit()
        }
        _ => false,
    }
}

fn resolve_layer<B: DocumentBackend + ?Sized>(
    tree: &mut LayerTree,
    backend: &B,
    layer: &CollectedLayer,
    ctx: &mut RunContext<'_>,
    placement: Placement,
    skeleton: &mut Skeleton,
) -> ExportResult<Option<(ResolvedLayer, Option<BoneId>)>> {
    let id = layer.node;
    let raw_name = tree.node(id).name.clone();

    let name = match tree.apply_name_patterns(id, &sanitize_name(&raw_name)) {
        Ok(name) => name,
        Err(holder) => {
            ctx.issues.push(
                IssueKind::InvalidNamePattern,
                format!(
                    "The pattern for the [name:pattern] tag must contain an asterisk (*):\n\n{}",
                    tree.node(holder).name
                ),
            );
            return Ok(None);
        }
    };
    if name.is_empty() {
        return Ok(None);
    }
    if is_reserved_device_name(&name) || name.chars().count() > MAX_NAME_LEN {
        ctx.issues.push(
            IssueKind::InvalidName,
            format!("Layer name is not a valid attachment name:\n\n{raw_name}"),
        );
        return Ok(None);
    }

    let path = tree.display_path(id);
    let folder = tree.folder_prefix(id);
    let (name, attachment_name) = match name.strip_prefix('/') {
        Some(absolute) => (absolute.to_owned(), absolute.to_owned()),
        None => (name.clone(), format!("{folder}{name}")),
    };

    let attachment_path = match tree.node(id).tags.value(TagKind::Path) {
        Some(p) => match p.strip_prefix('/') {
            Some(absolute) => absolute.to_owned(),
            None => format!("{folder}{p}"),
        },
        None => attachment_name.clone(),
    };

    let scale = match tree.node(id).tags.value(TagKind::Scale) {
        None => 1.0,
        Some(v) => match v.parse::<f64>() {
            Ok(s) if s.is_finite() && s > 0.0 => s,
            _ => {
                ctx.issues
                    .push(IssueKind::InvalidScale, format!("Invalid scale {v}:\n\n{path}"));
                return Ok(None);
            }
        },
    };

    let mut bone = None;
    if let Some(bone_node) = tree.find_tag(id, TagKind::Bone) {
        let Some(b) = skeleton.bones.resolve(tree, bone_node, &mut ctx.issues) else {
            return Ok(None);
        };
        let bounds = tree.bounds(backend, id)?;
        skeleton
            .bones
            .set_position_if_unset(b, bone_anchor(bounds, placement));
        bone = Some(b);
    }

    let Some(skin_name) = resolve_skin(tree, id, ctx, &path) else {
        return Ok(None);
    };

    let placeholder_name = if skin_name == DEFAULT_SKIN {
        attachment_name.clone()
    } else {
        match attachment_name
            .strip_prefix(skin_name.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        {
            Some(rest) => rest.to_owned(),
            None => {
                ctx.issues.push(
                    IssueKind::SkinPrefix,
                    format!(
                        "Expected attachment name \"{attachment_name}\" to start with skin name: {skin_name}/"
                    ),
                );
                return Ok(None);
            }
        }
    };

    let tags = &tree.node(id).tags;
    let mesh = match tags.get(TagKind::Mesh) {
        None => MeshLink::None,
        Some(t) => match &t.value {
            Some(source) => MeshLink::Linked {
                name: source.clone(),
                source: None,
            },
            None => MeshLink::Source,
        },
    };
    let trim = tags
        .get(TagKind::Trim)
        .map(|t| t.value.as_deref() != Some("false"));

    let slot_name = tree
        .find_tag_value(id, TagKind::Slot)
        .filter(|s| !s.is_empty())
        .unwrap_or(name);

    Ok(Some((
        ResolvedLayer {
            node: id,
            path,
            attachment_name,
            attachment_path,
            placeholder_name,
            slot_name,
            skin_name,
            scale,
            trim,
            mesh,
            overlays: layer.overlays.clone(),
            was_visible: layer.was_visible,
            geometry: None,
        },
        bone,
    )))
}

/// Skin of `id`: the nearest `[skin]` value, qualified by the folders above the declaring
/// node unless absolute.
fn resolve_skin(
    tree: &LayerTree,
    id: NodeId,
    ctx: &mut RunContext<'_>,
    path: &str,
) -> Option<String> {
    let Some(skin_node) = tree.find_tag(id, TagKind::Skin) else {
        return Some(DEFAULT_SKIN.to_owned());
    };
    let value = tree.tag_value(skin_node, TagKind::Skin);
    let name = match value.strip_prefix('/') {
        Some(absolute) => absolute.to_owned(),
        None => match tree.node(skin_node).parent {
            Some(parent) => format!("{}{value}", tree.folder_prefix(parent)),
            None => value,
        },
    };
    if name.is_empty() {
        return Some(DEFAULT_SKIN.to_owned());
    }
    if name.eq_ignore_ascii_case(DEFAULT_SKIN) {
        ctx.issues.push(
            IssueKind::ReservedSkin,
            format!(
                "The skin name \"default\" is reserved:\n\n{path}\n\nPlease use a different name."
            ),
        );
        return None;
    }
    Some(name)
}

fn slot_blend(mode: BlendMode) -> Option<SlotBlend> {
    match mode {
        BlendMode::LinearDodge => Some(SlotBlend::Additive),
        BlendMode::Multiply => Some(SlotBlend::Multiply),
        BlendMode::Screen => Some(SlotBlend::Screen),
        _ => None,
    }
}

fn register(tree: &LayerTree, skeleton: &mut Skeleton, layer: ResolvedLayer, bone: Option<BoneId>) {
    let index = skeleton.layers.len();
    let blend = tree.node(layer.node).blend;

    let slot = skeleton
        .slots
        .entry(layer.slot_name.clone())
        .or_insert_with(|| Slot::new(layer.slot_name.clone(), bone));
    if slot.attachment.is_none() && layer.was_visible {
        slot.attachment = Some(layer.placeholder_name.clone());
    }
    if slot.blend.is_none() {
        match slot_blend(blend) {
            Some(b) => slot.blend = Some(b),
            None if !matches!(blend, BlendMode::Normal | BlendMode::PassThrough) => {
                tracing::debug!(slot = %slot.name, ?blend, "blend mode has no slot equivalent");
            }
            None => {}
        }
    }
    slot.layers.insert(layer.attachment_name.clone(), index);
    slot.placeholders
        .entry(layer.skin_name.clone())
        .or_default()
        .entry(layer.placeholder_name.clone())
        .or_default()
        .push(index);

    skeleton
        .skins
        .entry(layer.skin_name.clone())
        .or_insert_with(|| Skin {
            name: layer.skin_name.clone(),
            slots: Default::default(),
        })
        .slots
        .entry(layer.slot_name.clone())
        .or_default()
        .push(index);

    skeleton.layers.push(layer);
}

#[cfg(test)]
#[path = "../../tests/unit/skeleton/resolve.rs"]
mod tests;
