//! Contract between the exporter and the image-editing host that owns the layered document.
//!
//! All exporter code talks to the host through [`DocumentBackend`]; the host's own tree shape and
//! property model never leak past this module. [`MemoryDocument`] is a complete in-process
//! implementation used by the command line front end and by the test suite.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::foundation::core::{LayerId, Rect, Vec2};
use crate::foundation::error::ExportResult;

pub mod document;
pub mod memory;

pub use memory::MemoryDocument;

/// Document-wide properties.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentInfo {
    /// File name of the document, including its extension.
    pub name: String,
    /// Folder the document lives in; relative output paths resolve against it.
    pub folder: PathBuf,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Ruler origin in canvas pixels.
    pub ruler_origin: Vec2,
    pub color_mode: ColorMode,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Rgb,
    Grayscale,
    Cmyk,
    Indexed,
    Bitmap,
}

/// Position of an entry in the flat layer stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    /// A leaf layer.
    Content,
    /// The opening entry of a group. Its children sit directly below it.
    GroupStart,
    /// The closing marker of a group, below its last child.
    GroupEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Pixel,
    Adjustment,
    Text,
    Shape,
    SmartObject,
    Other,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    PassThrough,
    #[default]
    Normal,
    Dissolve,
    Darken,
    Multiply,
    ColorBurn,
    LinearBurn,
    DarkerColor,
    Lighten,
    Screen,
    ColorDodge,
    LinearDodge,
    LighterColor,
    Overlay,
    SoftLight,
    HardLight,
    VividLight,
    LinearLight,
    PinLight,
    HardMix,
    Difference,
    Exclusion,
    Subtract,
    Divide,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

/// Snapshot of one entry's properties.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    pub section: Section,
    pub visible: bool,
    pub locked: bool,
    /// The locked bottom "Background" layer.
    pub background: bool,
    /// Clipped to the layer below it.
    pub clipping: bool,
    pub blend: BlendMode,
    pub kind: LayerKind,
}

/// Opaque handle to a saved document state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Checkpoint(pub u64);

/// Operations the exporter needs from the host application.
///
/// Stack indices count from the bottom entry (`0`) to the top entry (`layer_count() - 1`).
/// Group end markers occupy their own index.
pub trait DocumentBackend {
    fn info(&self) -> ExportResult<DocumentInfo>;

    /// Switch the document to RGB. Hosts that cannot convert leave the mode unchanged.
    fn convert_to_rgb(&mut self) -> ExportResult<()>;

    fn layer_count(&self) -> ExportResult<usize>;

    fn layer_at(&self, index: usize) -> ExportResult<LayerId>;

    fn layer_info(&self, id: LayerId) -> ExportResult<LayerInfo>;

    /// Tight bounds in canvas pixels, excluding layer style effects and honoring a user mask.
    /// A group covers its effectively visible children only. A layer without pixels reports an
    /// empty rectangle.
    fn bounds(&self, id: LayerId) -> ExportResult<Rect>;

    /// Layers selected by the user before the run started.
    fn selected_layers(&self) -> ExportResult<Vec<LayerId>>;

    fn set_visible(&mut self, id: LayerId, visible: bool) -> ExportResult<()>;

    fn set_locked(&mut self, id: LayerId, locked: bool) -> ExportResult<()>;

    /// Select `id`, replacing the selection unless `additive`.
    fn select(&mut self, id: LayerId, additive: bool) -> ExportResult<()>;

    fn deselect_all(&mut self) -> ExportResult<()>;

    /// Move `id` directly above `target` in the stack.
    fn move_above(&mut self, id: LayerId, target: LayerId) -> ExportResult<()>;

    /// Clip `id` to the layer below it, or release it.
    fn set_clipping_mask(&mut self, id: LayerId, clipping: bool) -> ExportResult<()>;

    /// Merge the selection into one pixel layer and return its id.
    ///
    /// A single selected group flattens into a layer that keeps the group's id. A single
    /// selected pixel layer absorbs the layers clipped to it.
    fn merge_selected(&mut self) -> ExportResult<LayerId>;

    fn rasterize(&mut self, id: LayerId) -> ExportResult<()>;

    /// Rasterize every layer in one step. Hosts may fail on very large documents.
    fn rasterize_all(&mut self) -> ExportResult<()>;

    /// Bake layer style effects and clipped layers into `id`. No-op without effects.
    fn rasterize_styles(&mut self, id: LayerId) -> ExportResult<()>;

    /// Crop the canvas to `region` (canvas pixels).
    fn crop(&mut self, region: Rect) -> ExportResult<()>;

    /// Resize the canvas around its center without resampling.
    fn resize_canvas(&mut self, width: u32, height: u32) -> ExportResult<()>;

    /// Resample the whole document by `scale`.
    fn resize_image(&mut self, scale: f64) -> ExportResult<()>;

    /// Write the visible composite as a PNG.
    fn save_png(&mut self, path: &Path) -> ExportResult<()>;

    fn checkpoint(&mut self) -> ExportResult<Checkpoint>;

    /// Return to `checkpoint`. The checkpoint and every later one become invalid.
    fn restore(&mut self, checkpoint: Checkpoint) -> ExportResult<()>;
}

/// Run `f` between a checkpoint and its restore. The restore happens even when `f` fails.
pub fn with_checkpoint<B, T>(
    backend: &mut B,
    f: impl FnOnce(&mut B) -> ExportResult<T>,
) -> ExportResult<T>
where
    B: DocumentBackend + ?Sized,
{
    let checkpoint = backend.checkpoint()?;
    let out = f(backend);
    let restored = backend.restore(checkpoint);
    let value = out?;
    restored?;
    Ok(value)
}
