//! Skeleton JSON document.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::export::geometry::{
    AttachmentGeometry, MESH_EDGES, MESH_HULL, MESH_TRIANGLES, MESH_UVS,
};
use crate::foundation::error::{ExportError, ExportResult};
use crate::session::RunContext;
use crate::settings::{JsonFormat, Settings};
use crate::skeleton::bones::{BoneId, ROOT_BONE};
use crate::skeleton::model::{MeshLink, ResolvedLayer, Skeleton};

/// Key of the block echoing the run settings.
pub const SETTINGS_KEY: &str = "layer2spine";

/// Build the skeleton document. Layers without geometry are left out.
#[tracing::instrument(skip_all)]
pub(crate) fn skeleton_value(
    skeleton: &Skeleton,
    settings: &Settings,
    images_dir: Option<&Path>,
    ctx: &RunContext<'_>,
) -> ExportResult<Value> {
    let mut root = Map::new();
    root.insert("skeleton".into(), json!({ "images": images_ref(images_dir) }));
    root.insert(
        SETTINGS_KEY.into(),
        json!({
            "scale": number(settings.scale),
            "padding": settings.padding,
            "trim": settings.trim_whitespace,
        }),
    );

    let mut bones = Vec::with_capacity(skeleton.bones.len());
    for id in skeleton.bones.preorder() {
        ctx.check_cancel()?;
        bones.push(bone_value(skeleton, id));
    }
    root.insert("bones".into(), Value::Array(bones));

    let mut slots = Vec::new();
    for slot in skeleton.slots.values() {
        ctx.check_cancel()?;
        if !slot.has_attachments {
            continue;
        }
        let mut s = Map::new();
        s.insert("name".into(), slot.name.clone().into());
        let bone = slot
            .bone
            .map_or(ROOT_BONE, |b| skeleton.bones.get(b).name.as_str());
        s.insert("bone".into(), bone.into());
        if let Some(attachment) = &slot.attachment {
            s.insert("attachment".into(), attachment.clone().into());
        }
        if let Some(blend) = slot.blend {
            s.insert("blend".into(), blend.as_str().into());
        }
        slots.push(Value::Object(s));
    }
    root.insert("slots".into(), Value::Array(slots));

    let skins = skins(skeleton);
    if !skins.is_empty() {
        let value = match settings.format {
            JsonFormat::Legacy => Value::Object(skins.into_iter().collect()),
            JsonFormat::Current => Value::Array(
                skins
                    .into_iter()
                    .map(|(name, attachments)| json!({ "name": name, "attachments": attachments }))
                    .collect(),
            ),
        };
        root.insert("skins".into(), value);
    }

    root.insert("animations".into(), json!({ "animation": {} }));
    Ok(Value::Object(root))
}

/// Serialize with tab indentation and a trailing newline.
pub fn render(value: &Value) -> ExportResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| ExportError::serde(format!("serialize skeleton JSON: {e}")))?;
    let mut out =
        String::from_utf8(buf).map_err(|e| ExportError::serde(format!("skeleton JSON: {e}")))?;
    out.push('\n');
    Ok(out)
}

/// A JSON number without float noise: rounded to six decimals, no negative zero, integral
/// values as integers.
pub fn number(v: f64) -> Value {
    let rounded = (v * 1e6).round() / 1e6;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        Value::from(rounded as i64)
    } else {
        Value::from(rounded)
    }
}

fn images_ref(images_dir: Option<&Path>) -> String {
    match images_dir {
        Some(dir) => {
            let dir = dir.to_string_lossy().replace('\\', "/");
            format!("{}/", dir.trim_end_matches('/'))
        }
        None => String::new(),
    }
}

fn bone_value(skeleton: &Skeleton, id: BoneId) -> Value {
    let bone = skeleton.bones.get(id);
    let mut b = Map::new();
    b.insert("name".into(), bone.name.clone().into());
    if let Some(parent) = bone.parent {
        b.insert("parent".into(), skeleton.bones.get(parent).name.clone().into());
    }
    let local = skeleton.bones.local_position(id);
    for (key, v) in [("x", local.x), ("y", local.y)] {
        let n = number(v);
        if n.as_f64() != Some(0.0) {
            b.insert(key.into(), n);
        }
    }
    Value::Object(b)
}

/// Non-empty skins in first-seen order, each as slot name to placeholder to attachment.
fn skins(skeleton: &Skeleton) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for skin in skeleton.skins.values() {
        let mut attachments = Map::new();
        for (slot_name, layers) in &skin.slots {
            let mut slot = Map::new();
            for &i in layers.iter().rev() {
                let layer = &skeleton.layers[i];
                let Some(geometry) = &layer.geometry else {
                    continue;
                };
                slot.insert(
                    layer.placeholder_name.clone(),
                    attachment_value(skeleton, layer, geometry),
                );
            }
            if !slot.is_empty() {
                attachments.insert(slot_name.clone(), Value::Object(slot));
            }
        }
        if !attachments.is_empty() {
            out.push((skin.name.clone(), Value::Object(attachments)));
        }
    }
    out
}

fn attachment_value(
    skeleton: &Skeleton,
    layer: &ResolvedLayer,
    g: &AttachmentGeometry,
) -> Value {
    let mut a = Map::new();
    if layer.attachment_name != layer.placeholder_name {
        a.insert("name".into(), layer.attachment_name.clone().into());
    }
    if layer.attachment_name != layer.attachment_path {
        a.insert("path".into(), layer.attachment_path.clone().into());
    }

    let source = match &layer.mesh {
        MeshLink::None => {
            a.insert("x".into(), number(g.x));
            a.insert("y".into(), number(g.y));
            a.insert("width".into(), number(g.width));
            a.insert("height".into(), number(g.height));
            if g.scale != 1.0 {
                a.insert("scaleX".into(), number(1.0 / g.scale));
                a.insert("scaleY".into(), number(1.0 / g.scale));
            }
            return Value::Object(a);
        }
        MeshLink::Source => None,
        MeshLink::Linked { source, .. } => source.map(|s| &skeleton.layers[s]),
    };

    match source {
        Some(src) => {
            a.insert("type".into(), "linkedmesh".into());
            a.insert("parent".into(), src.placeholder_name.clone().into());
            a.insert("skin".into(), src.skin_name.clone().into());
        }
        None => {
            a.insert("type".into(), "mesh".into());
        }
    }
    a.insert("width".into(), number(g.width));
    a.insert("height".into(), number(g.height));
    a.insert(
        "vertices".into(),
        g.vertices().into_iter().map(number).collect(),
    );
    a.insert("uvs".into(), MESH_UVS.into_iter().map(number).collect());
    a.insert("triangles".into(), json!(MESH_TRIANGLES));
    a.insert("hull".into(), json!(MESH_HULL));
    a.insert("edges".into(), json!(MESH_EDGES));
    Value::Object(a)
}

#[cfg(test)]
#[path = "../../tests/unit/output/json.rs"]
mod tests;
