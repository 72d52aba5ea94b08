use super::*;
use crate::backend::{DocumentBackend, MemoryDocument};
use crate::export::geometry::Placement;
use crate::foundation::cancel::CancelToken;
use crate::output::report::Issue;
use crate::session::RunContext;
use crate::settings::Settings;
use crate::skeleton::resolve::resolve_skeleton;
use crate::tree::LayerTree;
use crate::tree::walk::collect_layers;
use serde_json::json;

fn checked(layers: serde_json::Value) -> (Skeleton, Vec<Issue>) {
    let settings = Settings::default();
    let v = json!({ "name": "t.psd", "width": 8, "height": 8, "layers": layers });
    let mut d = MemoryDocument::from_reader(v.to_string().as_bytes()).unwrap();
    let info = d.info().unwrap();
    let mut tree = LayerTree::build(&d, None).unwrap();
    let mut ctx = RunContext::new(&settings, CancelToken::new(), None);
    let collected = collect_layers(&mut tree, &mut d, &mut ctx).unwrap();
    let mut skeleton = resolve_skeleton(
        &mut tree,
        &d,
        &collected,
        &mut ctx,
        Placement::new(&settings, &info),
    )
    .unwrap();
    validate(&mut skeleton, &mut ctx.issues);
    (skeleton, ctx.issues.into_vec())
}

fn fill() -> serde_json::Value {
    json!({ "rect": [1, 1, 4, 4], "color": "#ff00ff" })
}

#[test]
fn duplicate_placeholders_are_grouped() {
    let (_, issues) = checked(json!([
        { "name": "L", "layers": [ { "name": "Eye", "fill": fill() } ] },
        { "name": "R", "layers": [ { "name": "Eye", "fill": fill() } ] }
    ]));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::DuplicatePlaceholder);
    assert_eq!(
        issues[0].message,
        "Multiple layers for the \"default\" skin in the \"Eye\" slot have the same name \"Eye\":\n\nR/Eye\nL/Eye\n\nRename or use the [ignore] tag for these layers."
    );
}

#[test]
fn skin_placeholder_shadowing_default_is_reported_once() {
    let (_, issues) = checked(json!([
        { "name": "Eye [slot:E]", "fill": fill() },
        { "name": "Alt [skin]", "layers": [ { "name": "Eye [slot:E]", "fill": fill() } ] }
    ]));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::DefaultSkinCollision);
    assert_eq!(
        issues[0].message,
        "Multiple layers for the \"E\" slot have the same name \"Eye\":\n\nEye [slot:E]\nAlt [skin]/Eye [slot:E]\n\nRename or use the [ignore] tag for these layers."
    );
}

#[test]
fn missing_mesh_source_is_reported() {
    let (_, issues) = checked(json!([
        { "name": "L [mesh:Nope] [slot:s]", "fill": fill() }
    ]));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::MissingMeshSource);
    assert_eq!(
        issues[0].message,
        "Source mesh \"Nope\" not found in slot \"s\":\n\nL [mesh:Nope] [slot:s]\n\nPrepend the skin name, if any. For example:\nskinName/Nope"
    );
}

#[test]
fn mesh_source_must_be_a_mesh() {
    let (_, issues) = checked(json!([
        { "name": "L [mesh:M] [slot:s]", "fill": fill() },
        { "name": "M [slot:s]", "fill": fill() }
    ]));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::NotAMesh);
    assert_eq!(
        issues[0].message,
        "Layer \"M [slot:s]\" is not a mesh:\n\nL [mesh:M] [slot:s]"
    );
}

#[test]
fn linked_mesh_is_bound_to_its_source() {
    let (sk, issues) = checked(json!([
        { "name": "L [mesh:M] [slot:s]", "fill": fill() },
        { "name": "M [mesh] [slot:s]", "fill": fill() }
    ]));
    assert!(issues.is_empty());
    let source = sk
        .layers
        .iter()
        .position(|l| l.attachment_name == "M")
        .unwrap();
    let linked = sk.layers.iter().find(|l| l.attachment_name == "L").unwrap();
    assert_eq!(
        linked.mesh,
        MeshLink::Linked {
            name: "M".to_owned(),
            source: Some(source)
        }
    );
}
