use super::*;
use crate::backend::MemoryDocument;
use crate::foundation::cancel::CancelToken;
use crate::settings::Settings;
use crate::skeleton::model::ResolvedLayer;
use crate::skeleton::resolve::resolve_skeleton;
use crate::tree::walk::collect_layers;
use serde_json::json;

struct Exported {
    skeleton: Skeleton,
    written: Vec<PathBuf>,
}

impl Exported {
    fn layer(&self, attachment: &str) -> &ResolvedLayer {
        self.skeleton
            .layers
            .iter()
            .find(|l| l.attachment_name == attachment)
            .unwrap()
    }
}

fn export(
    layers: serde_json::Value,
    settings: Settings,
    staging: Option<&Path>,
    cancel: CancelToken,
) -> ExportResult<Exported> {
    let v = json!({ "name": "t.psd", "width": 100, "height": 100, "layers": layers });
    let mut d = MemoryDocument::from_reader(v.to_string().as_bytes()).unwrap();
    let info = d.info().unwrap();
    let placement = Placement::new(&settings, &info);
    let mut tree = LayerTree::build(&d, None).unwrap();
    let mut ctx = RunContext::new(&settings, cancel.clone(), None);
    let collected = collect_layers(&mut tree, &mut d, &mut ctx).unwrap();
    let mut skeleton =
        resolve_skeleton(&mut tree, &d, &collected, &mut ctx, placement).unwrap();
    let written = export_attachments(
        &mut skeleton,
        &mut tree,
        &mut d,
        &mut ctx,
        placement,
        staging,
    )?;
    Ok(Exported { skeleton, written })
}

fn unpadded() -> Settings {
    Settings {
        padding: 0,
        ..Settings::default()
    }
}

#[test]
fn trimmed_image_is_written_and_placed() {
    let dir = tempfile::tempdir().unwrap();
    let out = export(
        json!([
            { "name": "Head", "fill": { "rect": [10, 20, 30, 60], "color": "#ffffff" } },
            { "name": "Empty" }
        ]),
        unpadded(),
        Some(dir.path()),
        CancelToken::new(),
    )
    .unwrap();

    assert_eq!(out.written, vec![PathBuf::from("Head.png")]);
    let img = image::open(dir.path().join("Head.png")).unwrap();
    assert_eq!((img.width(), img.height()), (20, 40));

    let head = out.layer("Head").geometry.clone().unwrap();
    assert_eq!((head.x, head.y), (20.0, -40.0));
    assert_eq!((head.width, head.height), (20.0, 40.0));
    assert!(out.skeleton.slots["Head"].has_attachments);

    assert_eq!(out.layer("Empty").geometry, None);
    assert!(!out.skeleton.slots["Empty"].has_attachments);
    assert!(!dir.path().join("Empty.png").exists());
    assert_eq!(out.skeleton.attachment_count(), 1);
}

#[test]
fn padding_grows_the_image_on_every_side() {
    let dir = tempfile::tempdir().unwrap();
    let out = export(
        json!([{ "name": "Head", "fill": { "rect": [10, 20, 30, 60], "color": "#ffffff" } }]),
        Settings::default(),
        Some(dir.path()),
        CancelToken::new(),
    )
    .unwrap();
    let img = image::open(dir.path().join("Head.png")).unwrap();
    assert_eq!((img.width(), img.height()), (22, 42));
    let head = out.layer("Head").geometry.clone().unwrap();
    assert_eq!((head.x, head.y), (20.0, -40.0));
    assert_eq!((head.width, head.height), (22.0, 42.0));
}

#[test]
fn attachment_paths_nest_and_deduplicate() {
    let dir = tempfile::tempdir().unwrap();
    let out = export(
        json!([
            { "name": "A [path:shared/img] [slot:a]", "fill": { "rect": [0, 0, 4, 4], "color": "#ff0000" } },
            { "name": "B [path:shared/img] [slot:b]", "fill": { "rect": [0, 0, 4, 4], "color": "#ff0000" } }
        ]),
        unpadded(),
        Some(dir.path()),
        CancelToken::new(),
    )
    .unwrap();
    assert_eq!(out.written, vec![PathBuf::from("shared/img.png")]);
    assert!(dir.path().join("shared").join("img.png").exists());
}

#[test]
fn overlays_are_clipped_into_the_image() {
    let dir = tempfile::tempdir().unwrap();
    export(
        json!([{ "name": "G", "layers": [
            { "name": "Shine [overlay]", "fill": { "rect": [0, 0, 100, 100], "color": "#ff0000" } },
            { "name": "Base", "fill": { "rect": [10, 20, 30, 60], "color": "#00ff00" } }
        ]}]),
        unpadded(),
        Some(dir.path()),
        CancelToken::new(),
    )
    .unwrap();
    let img = image::open(dir.path().join("Base.png")).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (20, 40));
    assert_eq!(img.get_pixel(5, 5).0, [255, 0, 0, 255]);
}

#[test]
fn geometry_is_computed_without_staging() {
    let out = export(
        json!([{ "name": "M [mesh]", "fill": { "rect": [10, 20, 30, 60], "color": "#ffffff" } }]),
        unpadded(),
        None,
        CancelToken::new(),
    )
    .unwrap();
    assert!(out.written.is_empty());
    let mesh = out.layer("M").geometry.clone().unwrap();
    assert!(mesh.mesh);
    assert_eq!((mesh.x, mesh.y), (10.0, -20.0));
}

#[test]
fn cancellation_stops_the_export() {
    let cancel = CancelToken::new();
    let v = json!({ "name": "t.psd", "width": 8, "height": 8,
        "layers": [{ "name": "A", "fill": { "rect": [0, 0, 4, 4], "color": "#ffffff" } }] });
    let settings = Settings::default();
    let mut d = MemoryDocument::from_reader(v.to_string().as_bytes()).unwrap();
    let info = d.info().unwrap();
    let placement = Placement::new(&settings, &info);
    let mut tree = LayerTree::build(&d, None).unwrap();
    let mut ctx = RunContext::new(&settings, cancel.clone(), None);
    let collected = collect_layers(&mut tree, &mut d, &mut ctx).unwrap();
    let mut skeleton =
        resolve_skeleton(&mut tree, &d, &collected, &mut ctx, placement).unwrap();

    cancel.cancel();
    let err = export_attachments(&mut skeleton, &mut tree, &mut d, &mut ctx, placement, None)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(skeleton.attachment_count(), 0);
}

#[test]
fn merged_bone_group_sits_on_its_bone() {
    let dir = tempfile::tempdir().unwrap();
    let out = export(
        json!([{ "name": "Body [bone] [merge]", "layers": [
            { "name": "X [ignore]", "fill": { "rect": [80, 80, 90, 90], "color": "#ffffff" } },
            { "name": "A", "fill": { "rect": [10, 10, 20, 20], "color": "#ffffff" } }
        ]}]),
        unpadded(),
        Some(dir.path()),
        CancelToken::new(),
    )
    .unwrap();
    let body = out.layer("Body").geometry.clone().unwrap();
    assert_eq!((body.x, body.y), (0.0, 0.0));
    assert_eq!((body.width, body.height), (10.0, 10.0));
}
