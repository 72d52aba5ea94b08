use super::*;
use crate::backend::MemoryDocument;
use serde_json::json;

fn doc(v: serde_json::Value) -> MemoryDocument {
    MemoryDocument::from_reader(v.to_string().as_bytes()).unwrap()
}

fn rig() -> MemoryDocument {
    doc(json!({
        "name": "rig.psd", "width": 20, "height": 20,
        "layers": [
            { "name": "Top [slot:S]", "fill": { "rect": [0, 0, 4, 4], "color": "#ff0000" } },
            { "name": "Body [bone] [folder:parts]", "selected": true, "layers": [
                { "name": "Arm [bone:arm]", "layers": [
                    { "name": "Hand", "fill": { "rect": [2, 3, 6, 9], "color": "#00ff00" } }
                ]},
                { "name": "Leg", "visible": false, "locked": true }
            ]}
        ]
    }))
}

fn by_name(tree: &LayerTree, name: &str) -> NodeId {
    (0..tree.len() as u32)
        .map(NodeId)
        .find(|&id| tree.node(id).name == name)
        .unwrap()
}

#[test]
fn build_mirrors_the_stack_top_down() {
    let d = rig();
    let tree = LayerTree::build(&d, None).unwrap();
    assert_eq!(tree.len(), 5);
    let roots: Vec<_> = tree.roots().iter().map(|&r| tree.node(r).name.as_str()).collect();
    assert_eq!(roots, vec!["Top [slot:S]", "Body [bone] [folder:parts]"]);

    let body = by_name(&tree, "Body [bone] [folder:parts]");
    assert_eq!(tree.node(body).role, NodeRole::Group);
    let children: Vec<_> = tree
        .node(body)
        .children
        .iter()
        .map(|&c| tree.node(c).name.as_str())
        .collect();
    assert_eq!(children, vec!["Arm [bone:arm]", "Leg"]);

    let hand = by_name(&tree, "Hand");
    assert_eq!(tree.node(hand).role, NodeRole::Layer);
    assert_eq!(tree.node(tree.node(hand).parent.unwrap()).name, "Arm [bone:arm]");
}

#[test]
fn selection_is_inherited_by_descendants() {
    let d = rig();
    let selected = d.selected_layers().unwrap();
    let tree = LayerTree::build(&d, Some(&selected)).unwrap();
    assert!(tree.node(by_name(&tree, "Hand")).selected);
    assert!(tree.node(by_name(&tree, "Leg")).selected);
    assert!(!tree.node(by_name(&tree, "Top [slot:S]")).selected);
}

#[test]
fn inherited_tags_resolve_to_nearest_declaration() {
    let d = rig();
    let tree = LayerTree::build(&d, None).unwrap();
    let hand = by_name(&tree, "Hand");
    let leg = by_name(&tree, "Leg");
    let arm = by_name(&tree, "Arm [bone:arm]");
    let body = by_name(&tree, "Body [bone] [folder:parts]");

    assert_eq!(tree.find_tag(hand, TagKind::Bone), Some(arm));
    assert_eq!(tree.find_tag(leg, TagKind::Bone), Some(body));
    assert_eq!(tree.find_tag_value(hand, TagKind::Bone).as_deref(), Some("arm"));
    assert_eq!(tree.find_tag_value(leg, TagKind::Bone).as_deref(), Some("Body"));
    assert_eq!(tree.find_tag(hand, TagKind::Slot), None);
}

#[test]
fn own_tags_do_not_inherit() {
    let d = doc(json!({
        "name": "t.psd", "width": 4, "height": 4,
        "layers": [
            { "name": "G [ignore]", "layers": [ { "name": "L [trim]" } ] }
        ]
    }));
    let tree = LayerTree::build(&d, None).unwrap();
    let layer = by_name(&tree, "L [trim]");
    assert_eq!(tree.find_tag(layer, TagKind::Ignore), None);
    assert_eq!(tree.find_tag(layer, TagKind::Trim), Some(layer));
}

#[test]
fn display_path_joins_raw_names() {
    let d = rig();
    let tree = LayerTree::build(&d, None).unwrap();
    assert_eq!(
        tree.display_path(by_name(&tree, "Hand")),
        "Body [bone] [folder:parts]/Arm [bone:arm]/Hand"
    );
}

#[test]
fn folder_prefix_walks_outward() {
    let d = doc(json!({
        "name": "t.psd", "width": 4, "height": 4,
        "layers": [
            { "name": "[folder:outer]", "layers": [
                { "name": "Alt [skin]", "layers": [
                    { "name": "[skin:default]", "layers": [ { "name": "A" } ] },
                    { "name": "B [folder:/abs]" }
                ]}
            ]}
        ]
    }));
    let tree = LayerTree::build(&d, None).unwrap();
    assert_eq!(tree.folder_prefix(by_name(&tree, "A")), "outer/Alt/");
    assert_eq!(tree.folder_prefix(by_name(&tree, "B [folder:/abs]")), "abs/");
}

#[test]
fn name_patterns_apply_nearest_first() {
    let d = doc(json!({
        "name": "t.psd", "width": 4, "height": 4,
        "layers": [
            { "name": "[name:pre_*]", "layers": [
                { "name": "[name:*_x]", "layers": [ { "name": "L" } ] }
            ]},
            { "name": "[name:bad]", "layers": [ { "name": "M" } ] }
        ]
    }));
    let tree = LayerTree::build(&d, None).unwrap();
    assert_eq!(
        tree.apply_name_patterns(by_name(&tree, "L"), "L"),
        Ok("pre_L_x".to_owned())
    );
    assert_eq!(
        tree.apply_name_patterns(by_name(&tree, "M"), "M"),
        Err(by_name(&tree, "[name:bad]"))
    );
}

#[test]
fn bounds_are_cached_until_invalidated() {
    let mut d = rig();
    let mut tree = LayerTree::build(&d, None).unwrap();
    let hand = by_name(&tree, "Hand");
    assert_eq!(tree.bounds(&d, hand).unwrap(), Rect::new(2.0, 3.0, 6.0, 9.0));

    let top = by_name(&tree, "Top [slot:S]");
    d.select(tree.node(top).layer, false).unwrap();
    d.select(tree.node(hand).layer, true).unwrap();
    let merged = d.merge_selected().unwrap();
    assert_eq!(merged, tree.node(top).layer);

    tree.node_mut(hand).layer = merged;
    assert_eq!(tree.bounds(&d, hand).unwrap(), Rect::new(2.0, 3.0, 6.0, 9.0));
    tree.invalidate_bounds(hand);
    assert_eq!(tree.bounds(&d, hand).unwrap(), Rect::new(0.0, 0.0, 6.0, 9.0));
}

#[test]
fn visibility_and_lock_track_the_backend() {
    let mut d = rig();
    let mut tree = LayerTree::build(&d, None).unwrap();
    let leg = by_name(&tree, "Leg");
    let layer = tree.node(leg).layer;

    tree.show(&mut d, leg).unwrap();
    tree.unlock(&mut d, leg).unwrap();
    let info = d.layer_info(layer).unwrap();
    assert!(info.visible && !info.locked);
    assert!(tree.node(leg).visible && !tree.node(leg).locked);

    tree.hide(&mut d, leg).unwrap();
    assert!(!d.layer_info(layer).unwrap().visible);
}

#[test]
fn flatten_turns_a_group_into_one_layer() {
    let mut d = rig();
    let mut tree = LayerTree::build(&d, None).unwrap();
    let arm = by_name(&tree, "Arm [bone:arm]");
    tree.flatten(&mut d, arm).unwrap();
    assert_eq!(tree.node(arm).kind, LayerKind::Pixel);
    let info = d.layer_info(tree.node(arm).layer).unwrap();
    assert_eq!(info.section, Section::Content);
    assert_eq!(tree.bounds(&d, arm).unwrap(), Rect::new(2.0, 3.0, 6.0, 9.0));
}
