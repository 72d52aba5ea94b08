use indexmap::IndexSet;

use crate::output::report::{IssueKind, IssueLog};
use crate::skeleton::model::{DEFAULT_SKIN, MeshLink, Skeleton};

/// Cross-layer checks run after resolution and before any image work.
///
/// Links every `[mesh:name]` layer to its source on success.
#[tracing::instrument(skip_all)]
pub fn validate(skeleton: &mut Skeleton, issues: &mut IssueLog) {
    duplicate_placeholders(skeleton, issues);
    link_meshes(skeleton, issues);
    default_skin_collisions(skeleton, issues);
}

fn paths(skeleton: &Skeleton, layers: &[usize]) -> String {
    layers
        .iter()
        .map(|&i| skeleton.layers[i].path.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn duplicate_placeholders(skeleton: &Skeleton, issues: &mut IssueLog) {
    for slot in skeleton.slots.values() {
        for (skin, placeholders) in &slot.placeholders {
            for (placeholder, layers) in placeholders {
                if layers.len() < 2 {
                    continue;
                }
                issues.push(
                    IssueKind::DuplicatePlaceholder,
                    format!(
                        "Multiple layers for the \"{skin}\" skin in the \"{}\" slot have the same name \"{placeholder}\":\n\n{}\n\nRename or use the [ignore] tag for these layers.",
                        slot.name,
                        paths(skeleton, layers)
                    ),
                );
            }
        }
    }
}

fn link_meshes(skeleton: &mut Skeleton, issues: &mut IssueLog) {
    for index in 0..skeleton.layers.len() {
        let layer = &skeleton.layers[index];
        let MeshLink::Linked { name, .. } = &layer.mesh else {
            continue;
        };
        let Some(slot) = skeleton.slots.get(&layer.slot_name) else {
            continue;
        };
        let Some(&source) = slot.layers.get(name) else {
            issues.push(
                IssueKind::MissingMeshSource,
                format!(
                    "Source mesh \"{name}\" not found in slot \"{}\":\n\n{}\n\nPrepend the skin name, if any. For example:\nskinName/{name}",
                    slot.name, layer.path
                ),
            );
            continue;
        };
        if !skeleton.layers[source].mesh.is_mesh() {
            issues.push(
                IssueKind::NotAMesh,
                format!(
                    "Layer \"{}\" is not a mesh:\n\n{}",
                    skeleton.layers[source].path, layer.path
                ),
            );
            continue;
        }
        if let MeshLink::Linked { source: link, .. } = &mut skeleton.layers[index].mesh {
            *link = Some(source);
        }
    }
}

/// Skin placeholders that shadow a default-skin placeholder of the same slot. One issue per slot.
fn default_skin_collisions(skeleton: &Skeleton, issues: &mut IssueLog) {
    for slot in skeleton.slots.values() {
        let Some(defaults) = slot.placeholders.get(DEFAULT_SKIN) else {
            continue;
        };
        let mut colliding: IndexSet<usize> = IndexSet::new();
        let mut first_name = None;
        for (skin, placeholders) in &slot.placeholders {
            if skin == DEFAULT_SKIN {
                continue;
            }
            for (placeholder, layers) in placeholders {
                let Some(existing) = defaults.get(placeholder) else {
                    continue;
                };
                first_name.get_or_insert(placeholder.as_str());
                for &e in existing {
                    colliding.shift_remove(&e);
                    colliding.insert(e);
                }
                for &l in layers {
                    colliding.insert(l);
                }
            }
        }
        let Some(placeholder) = first_name else {
            continue;
        };
        let layers: Vec<usize> = colliding.into_iter().collect();
        issues.push(
            IssueKind::DefaultSkinCollision,
            format!(
                "Multiple layers for the \"{}\" slot have the same name \"{placeholder}\":\n\n{}\n\nRename or use the [ignore] tag for these layers.",
                slot.name,
                paths(skeleton, &layers)
            ),
        );
    }
}

#[cfg(test)]
#[path = "../../tests/unit/skeleton/validate.rs"]
mod tests;
