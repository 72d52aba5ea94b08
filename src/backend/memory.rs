use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};

use crate::backend::document::{DocumentDef, KindDef, LayerDef};
use crate::backend::{
    BlendMode, Checkpoint, ColorMode, DocumentBackend, DocumentInfo, LayerInfo, LayerKind, Section,
};
use crate::foundation::core::{LayerId, Rect, Vec2};
use crate::foundation::error::{ExportError, ExportResult};

type PremulRgba8 = [u8; 4];

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    id: LayerId,
    name: String,
    section: Section,
    visible: bool,
    locked: bool,
    background: bool,
    clipping: bool,
    effects: bool,
    blend: BlendMode,
    kind: LayerKind,
    /// Canvas-sized premultiplied pixels; `None` for group entries and pixel-less layers.
    pixels: Option<RgbaImage>,
}

impl Entry {
    fn is_content(&self) -> bool {
        self.section == Section::Content
    }
}

#[derive(Clone, Debug, PartialEq)]
struct State {
    width: u32,
    height: u32,
    ruler_origin: Vec2,
    mode: ColorMode,
    /// Bottom to top.
    entries: Vec<Entry>,
    selection: Vec<LayerId>,
}

/// Layered raster document held entirely in memory.
///
/// Pixels are premultiplied RGBA8 at canvas size per layer. Blend modes are recorded but every
/// layer composites as normal source-over; clipped layers are masked by the alpha of their base.
#[derive(Clone, Debug)]
pub struct MemoryDocument {
    name: String,
    folder: PathBuf,
    state: State,
    history: Vec<State>,
    next_id: u32,
}

impl MemoryDocument {
    /// Parse a document description from a JSON reader. Image sources resolve against the
    /// current directory.
    pub fn from_reader<R: std::io::Read>(r: R) -> ExportResult<Self> {
        let def: DocumentDef = serde_json::from_reader(r)
            .map_err(|e| ExportError::validation(format!("parse document JSON: {e}")))?;
        Self::from_def(def, PathBuf::from("."))
    }

    /// Load a document description; the file's folder becomes the document folder.
    pub fn from_path(path: impl AsRef<Path>) -> ExportResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            ExportError::validation(format!("open document JSON '{}': {e}", path.display()))
        })?;
        let def: DocumentDef = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| ExportError::validation(format!("parse document JSON: {e}")))?;
        let folder = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_def(def, folder)
    }

    pub fn from_def(def: DocumentDef, folder: PathBuf) -> ExportResult<Self> {
        if def.width == 0 || def.height == 0 {
            return Err(ExportError::validation("document canvas must be non-empty"));
        }
        let mut doc = Self {
            name: def.name,
            folder,
            state: State {
                width: def.width,
                height: def.height,
                ruler_origin: Vec2::new(def.ruler_origin[0], def.ruler_origin[1]),
                mode: def.mode,
                entries: Vec::new(),
                selection: Vec::new(),
            },
            history: Vec::new(),
            next_id: 1,
        };

        let mut top_down = Vec::new();
        doc.load_layers(&def.layers, &mut top_down)?;
        top_down.reverse();
        doc.state.entries = top_down;
        Ok(doc)
    }

    /// Change the folder that relative output paths resolve against.
    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Whether the visible document content, selection and layer properties equal `other`'s.
    pub fn same_content(&self, other: &Self) -> bool {
        self.state == other.state
    }

    /// Visible composite as straight RGBA8.
    pub fn composite(&self) -> RgbaImage {
        let mut img = self.composite_premul();
        for px in img.pixels_mut() {
            px.0 = unpremultiply(px.0);
        }
        img
    }

    fn load_layers(&mut self, defs: &[LayerDef], out: &mut Vec<Entry>) -> ExportResult<()> {
        for def in defs {
            let id = self.alloc_id();
            if def.selected {
                self.state.selection.push(id);
            }
            let entry = |section, blend, kind, pixels| Entry {
                id,
                name: def.name.clone(),
                section,
                visible: def.visible,
                locked: def.locked,
                background: def.background,
                clipping: def.clipping,
                effects: def.effects,
                blend,
                kind,
                pixels,
            };

            match &def.layers {
                Some(children) => {
                    out.push(entry(
                        Section::GroupStart,
                        def.blend.unwrap_or(BlendMode::PassThrough),
                        LayerKind::Pixel,
                        None,
                    ));
                    self.load_layers(children, out)?;
                    let end = self.alloc_id();
                    out.push(Entry {
                        id: end,
                        name: "</Layer group>".to_owned(),
                        section: Section::GroupEnd,
                        visible: true,
                        locked: false,
                        background: false,
                        clipping: false,
                        effects: false,
                        blend: BlendMode::PassThrough,
                        kind: LayerKind::Pixel,
                        pixels: None,
                    });
                }
                None => {
                    let pixels = self.layer_pixels(def)?;
                    out.push(entry(
                        Section::Content,
                        def.blend.unwrap_or_default(),
                        def.kind.into(),
                        pixels,
                    ));
                }
            }
        }
        Ok(())
    }

    fn layer_pixels(&self, def: &LayerDef) -> ExportResult<Option<RgbaImage>> {
        if def.kind == KindDef::Adjustment {
            return Ok(None);
        }
        let mut img = RgbaImage::new(self.state.width, self.state.height);
        if let Some(fill) = def.fill {
            let [l, t, r, b] = fill.rect;
            let color = fill.color.premultiplied();
            let x0 = clamp_px(l, self.state.width);
            let y0 = clamp_px(t, self.state.height);
            let x1 = clamp_px(r, self.state.width);
            let y1 = clamp_px(b, self.state.height);
            for y in y0..y1 {
                for x in x0..x1 {
                    img.put_pixel(x, y, image::Rgba(color));
                }
            }
        }
        if let Some(src) = &def.image {
            let path = if src.source.is_absolute() {
                src.source.clone()
            } else {
                self.folder.join(&src.source)
            };
            let mut placed = image::open(&path)
                .with_context(|| format!("open layer image '{}'", path.display()))?
                .to_rgba8();
            for px in placed.pixels_mut() {
                px.0 = premultiply(px.0);
            }
            let mut layer = RgbaImage::new(self.state.width, self.state.height);
            imageops::replace(&mut layer, &placed, src.offset[0], src.offset[1]);
            over_image(&mut img, &layer, None);
        }
        Ok(Some(img))
    }

    fn alloc_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: LayerId) -> ExportResult<usize> {
        self.state
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| ExportError::backend(format!("unknown layer {id}")))
    }

    fn entry(&self, id: LayerId) -> ExportResult<&Entry> {
        let idx = self.index_of(id)?;
        Ok(&self.state.entries[idx])
    }

    fn entry_mut(&mut self, id: LayerId) -> ExportResult<&mut Entry> {
        let idx = self.index_of(id)?;
        Ok(&mut self.state.entries[idx])
    }

    /// Index of the group end marker matching the group start at `start`.
    fn group_end(&self, start: usize) -> ExportResult<usize> {
        let mut depth = 0usize;
        for idx in (0..start).rev() {
            match self.state.entries[idx].section {
                Section::GroupStart => depth += 1,
                Section::GroupEnd if depth == 0 => return Ok(idx),
                Section::GroupEnd => depth -= 1,
                Section::Content => {}
            }
        }
        Err(ExportError::backend("unbalanced layer group"))
    }

    /// Effective visibility of entries in `range`, with the entries above `range` ignored.
    fn effective_visibility(&self, range: std::ops::Range<usize>) -> Vec<bool> {
        let mut out = vec![false; range.len()];
        let mut groups: Vec<bool> = Vec::new();
        for idx in range.clone().rev() {
            let e = &self.state.entries[idx];
            let parent = groups.last().copied().unwrap_or(true);
            match e.section {
                Section::GroupStart => groups.push(parent && e.visible),
                Section::GroupEnd => {
                    groups.pop();
                }
                Section::Content => out[idx - range.start] = parent && e.visible,
            }
        }
        out
    }

    /// Composite entries in `range` bottom to top onto a transparent canvas.
    fn composite_range(&self, range: std::ops::Range<usize>) -> RgbaImage {
        let visible = self.effective_visibility(range.clone());
        let mut canvas = RgbaImage::new(self.state.width, self.state.height);
        let mut base: Option<usize> = None;
        for idx in range.clone() {
            let e = &self.state.entries[idx];
            if !e.is_content() {
                base = None;
                continue;
            }
            let clip_base = if e.clipping { base } else { None };
            if !e.clipping || base.is_none() {
                base = Some(idx);
            }
            if !visible[idx - range.start] {
                continue;
            }
            let Some(pixels) = &e.pixels else {
                continue;
            };
            match clip_base {
                Some(b) => {
                    if !visible[b - range.start] {
                        continue;
                    }
                    let mask = self.state.entries[b].pixels.as_ref();
                    over_image(&mut canvas, pixels, mask);
                }
                None => over_image(&mut canvas, pixels, None),
            }
        }
        canvas
    }

    fn composite_premul(&self) -> RgbaImage {
        self.composite_range(0..self.state.entries.len())
    }

    /// Bake the clipped layers directly above `idx` into it.
    fn merge_clipped_into(&mut self, idx: usize) -> ExportResult<()> {
        let mut top = idx + 1;
        while top < self.state.entries.len()
            && self.state.entries[top].is_content()
            && self.state.entries[top].clipping
        {
            top += 1;
        }
        if top == idx + 1 {
            return Ok(());
        }
        let merged = self.composite_range(idx..top);
        let base = &mut self.state.entries[idx];
        base.pixels = Some(merged);
        base.kind = LayerKind::Pixel;
        self.state.entries.drain(idx + 1..top);
        Ok(())
    }

    fn flatten_group(&mut self, start: usize) -> ExportResult<()> {
        let end = self.group_end(start)?;
        let merged = self.composite_range(end + 1..start);
        let group = &self.state.entries[start];
        let flat = Entry {
            id: group.id,
            name: group.name.clone(),
            section: Section::Content,
            visible: group.visible,
            locked: false,
            background: false,
            clipping: group.clipping,
            effects: group.effects,
            blend: match group.blend {
                BlendMode::PassThrough => BlendMode::Normal,
                other => other,
            },
            kind: LayerKind::Pixel,
            pixels: Some(merged),
        };
        self.state.entries.drain(end..start);
        self.state.entries[end] = flat;
        Ok(())
    }

    fn merge_layers(&mut self, ids: &[LayerId]) -> ExportResult<LayerId> {
        let mut indices = ids
            .iter()
            .map(|&id| self.index_of(id))
            .collect::<ExportResult<Vec<_>>>()?;
        indices.sort_unstable();
        indices.dedup();
        if indices
            .iter()
            .any(|&i| !self.state.entries[i].is_content())
        {
            return Err(ExportError::backend(
                "merging several entries requires leaf layers only",
            ));
        }

        let visible = self.effective_visibility(0..self.state.entries.len());
        let mut canvas = RgbaImage::new(self.state.width, self.state.height);
        for &i in &indices {
            if let (true, Some(px)) = (visible[i], &self.state.entries[i].pixels) {
                over_image(&mut canvas, px, None);
            }
        }

        let Some(&top) = indices.last() else {
            return Err(ExportError::backend("nothing selected to merge"));
        };
        let target = &mut self.state.entries[top];
        target.pixels = Some(canvas);
        target.kind = LayerKind::Pixel;
        target.visible = true;
        let id = target.id;
        for &i in indices[..indices.len() - 1].iter().rev() {
            self.state.entries.remove(i);
        }
        Ok(id)
    }

    fn transform_pixels(&mut self, mut f: impl FnMut(&RgbaImage) -> RgbaImage) {
        for e in &mut self.state.entries {
            if let Some(px) = &e.pixels {
                e.pixels = Some(f(px));
            }
        }
    }
}

impl DocumentBackend for MemoryDocument {
    fn info(&self) -> ExportResult<DocumentInfo> {
        Ok(DocumentInfo {
            name: self.name.clone(),
            folder: self.folder.clone(),
            width: self.state.width,
            height: self.state.height,
            ruler_origin: self.state.ruler_origin,
            color_mode: self.state.mode,
        })
    }

    fn convert_to_rgb(&mut self) -> ExportResult<()> {
        match self.state.mode {
            ColorMode::Bitmap => {}
            _ => self.state.mode = ColorMode::Rgb,
        }
        Ok(())
    }

    fn layer_count(&self) -> ExportResult<usize> {
        Ok(self.state.entries.len())
    }

    fn layer_at(&self, index: usize) -> ExportResult<LayerId> {
        self.state
            .entries
            .get(index)
            .map(|e| e.id)
            .ok_or_else(|| ExportError::backend(format!("layer index {index} out of range")))
    }

    fn layer_info(&self, id: LayerId) -> ExportResult<LayerInfo> {
        let e = self.entry(id)?;
        Ok(LayerInfo {
            name: e.name.clone(),
            section: e.section,
            visible: e.visible,
            locked: e.locked,
            background: e.background,
            clipping: e.clipping,
            blend: e.blend,
            kind: e.kind,
        })
    }

    fn bounds(&self, id: LayerId) -> ExportResult<Rect> {
        let idx = self.index_of(id)?;
        let (range, counted) = match self.state.entries[idx].section {
            Section::Content => (idx..idx + 1, vec![true]),
            Section::GroupStart => {
                // Only children that would composite count toward a group.
                let range = self.group_end(idx)? + 1..idx;
                let visible = self.effective_visibility(range.clone());
                (range, visible)
            }
            Section::GroupEnd => return Ok(Rect::ZERO),
        };
        let mut out: Option<Rect> = None;
        for (e, counted) in self.state.entries[range].iter().zip(counted) {
            if !counted {
                continue;
            }
            if let Some(r) = e.pixels.as_ref().and_then(alpha_bounds) {
                out = Some(out.map_or(r, |acc| acc.union(r)));
            }
        }
        Ok(out.unwrap_or(Rect::ZERO))
    }

    fn selected_layers(&self) -> ExportResult<Vec<LayerId>> {
        Ok(self.state.selection.clone())
    }

    fn set_visible(&mut self, id: LayerId, visible: bool) -> ExportResult<()> {
        self.entry_mut(id)?.visible = visible;
        Ok(())
    }

    fn set_locked(&mut self, id: LayerId, locked: bool) -> ExportResult<()> {
        self.entry_mut(id)?.locked = locked;
        Ok(())
    }

    fn select(&mut self, id: LayerId, additive: bool) -> ExportResult<()> {
        self.index_of(id)?;
        if !additive {
            self.state.selection.clear();
        }
        if !self.state.selection.contains(&id) {
            self.state.selection.push(id);
        }
        Ok(())
    }

    fn deselect_all(&mut self) -> ExportResult<()> {
        self.state.selection.clear();
        Ok(())
    }

    fn move_above(&mut self, id: LayerId, target: LayerId) -> ExportResult<()> {
        let from = self.index_of(id)?;
        if !self.state.entries[from].is_content() {
            return Err(ExportError::backend(format!("cannot move group entry {id}")));
        }
        if id == target {
            return Ok(());
        }
        let entry = self.state.entries.remove(from);
        let to = self.index_of(target)?;
        self.state.entries.insert(to + 1, entry);
        Ok(())
    }

    fn set_clipping_mask(&mut self, id: LayerId, clipping: bool) -> ExportResult<()> {
        self.entry_mut(id)?.clipping = clipping;
        Ok(())
    }

    fn merge_selected(&mut self) -> ExportResult<LayerId> {
        let selection = self.state.selection.clone();
        let id = match selection.as_slice() {
            [] => return Err(ExportError::backend("nothing selected to merge")),
            [single] => {
                let idx = self.index_of(*single)?;
                match self.state.entries[idx].section {
                    Section::GroupStart => self.flatten_group(idx)?,
                    Section::Content => self.merge_clipped_into(idx)?,
                    Section::GroupEnd => {
                        return Err(ExportError::backend("cannot merge a group end marker"));
                    }
                }
                *single
            }
            many => self.merge_layers(many)?,
        };
        self.state.selection = vec![id];
        Ok(id)
    }

    fn rasterize(&mut self, id: LayerId) -> ExportResult<()> {
        let e = self.entry_mut(id)?;
        if matches!(
            e.kind,
            LayerKind::Text | LayerKind::Shape | LayerKind::SmartObject
        ) {
            e.kind = LayerKind::Pixel;
        }
        Ok(())
    }

    fn rasterize_all(&mut self) -> ExportResult<()> {
        let ids: Vec<_> = self
            .state
            .entries
            .iter()
            .filter(|e| e.is_content())
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.rasterize(id)?;
        }
        Ok(())
    }

    fn rasterize_styles(&mut self, id: LayerId) -> ExportResult<()> {
        let idx = self.index_of(id)?;
        if !self.state.entries[idx].effects {
            return Ok(());
        }
        self.merge_clipped_into(idx)?;
        self.state.entries[idx].effects = false;
        Ok(())
    }

    fn crop(&mut self, region: Rect) -> ExportResult<()> {
        let x0 = clamp_px(region.x0.floor(), self.state.width);
        let y0 = clamp_px(region.y0.floor(), self.state.height);
        let x1 = clamp_px(region.x1.ceil(), self.state.width);
        let y1 = clamp_px(region.y1.ceil(), self.state.height);
        if x1 <= x0 || y1 <= y0 {
            return Err(ExportError::backend(format!(
                "crop region {region:?} does not intersect the canvas"
            )));
        }
        let (w, h) = (x1 - x0, y1 - y0);
        self.transform_pixels(|px| imageops::crop_imm(px, x0, y0, w, h).to_image());
        self.state.width = w;
        self.state.height = h;
        self.state.ruler_origin -= Vec2::new(f64::from(x0), f64::from(y0));
        Ok(())
    }

    fn resize_canvas(&mut self, width: u32, height: u32) -> ExportResult<()> {
        if width == 0 || height == 0 {
            return Err(ExportError::backend("canvas size must be non-zero"));
        }
        let dx = (i64::from(width) - i64::from(self.state.width)) / 2;
        let dy = (i64::from(height) - i64::from(self.state.height)) / 2;
        self.transform_pixels(|px| {
            let mut out = RgbaImage::new(width, height);
            imageops::replace(&mut out, px, dx, dy);
            out
        });
        self.state.width = width;
        self.state.height = height;
        self.state.ruler_origin += Vec2::new(dx as f64, dy as f64);
        Ok(())
    }

    fn resize_image(&mut self, scale: f64) -> ExportResult<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ExportError::backend(format!("invalid resize scale {scale}")));
        }
        let w = ((f64::from(self.state.width) * scale).round() as u32).max(1);
        let h = ((f64::from(self.state.height) * scale).round() as u32).max(1);
        if (w, h) == (self.state.width, self.state.height) {
            return Ok(());
        }
        self.transform_pixels(|px| imageops::resize(px, w, h, FilterType::CatmullRom));
        self.state.width = w;
        self.state.height = h;
        self.state.ruler_origin *= scale;
        Ok(())
    }

    fn save_png(&mut self, path: &Path) -> ExportResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create folder '{}'", parent.display()))?;
        }
        self.composite()
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("write PNG '{}'", path.display()))?;
        Ok(())
    }

    fn checkpoint(&mut self) -> ExportResult<Checkpoint> {
        self.history.push(self.state.clone());
        Ok(Checkpoint(self.history.len() as u64 - 1))
    }

    fn restore(&mut self, checkpoint: Checkpoint) -> ExportResult<()> {
        let idx = usize::try_from(checkpoint.0)
            .ok()
            .filter(|&i| i < self.history.len())
            .ok_or_else(|| ExportError::backend(format!("unknown checkpoint {}", checkpoint.0)))?;
        self.history.truncate(idx + 1);
        if let Some(state) = self.history.pop() {
            self.state = state;
        }
        Ok(())
    }
}

fn clamp_px(v: f64, max: u32) -> u32 {
    v.round().clamp(0.0, f64::from(max)) as u32
}

/// Tight bounds of non-transparent pixels.
fn alpha_bounds(img: &RgbaImage) -> Option<Rect> {
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
    for (x, y, px) in img.enumerate_pixels() {
        if px.0[3] == 0 {
            continue;
        }
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x + 1);
        y1 = y1.max(y + 1);
    }
    (x1 > x0 && y1 > y0).then(|| {
        Rect::new(
            f64::from(x0),
            f64::from(y0),
            f64::from(x1),
            f64::from(y1),
        )
    })
}

/// Source-over `src` onto `dst`, optionally masked by the alpha channel of `mask`.
fn over_image(dst: &mut RgbaImage, src: &RgbaImage, mask: Option<&RgbaImage>) {
    for (x, y, d) in dst.enumerate_pixels_mut() {
        let s = src.get_pixel(x, y).0;
        let s = match mask {
            Some(m) => scale_px(s, m.get_pixel(x, y).0[3]),
            None => s,
        };
        d.0 = over(d.0, s);
    }
}

fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    let sa = src[3];
    if sa == 0 {
        return dst;
    }
    let inv = 255u16 - u16::from(sa);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

fn scale_px(px: PremulRgba8, by: u8) -> PremulRgba8 {
    px.map(|c| mul_div255(u16::from(c), u16::from(by)))
}

fn premultiply(px: [u8; 4]) -> PremulRgba8 {
    let a = px[3];
    [
        mul_div255(u16::from(px[0]), u16::from(a)),
        mul_div255(u16::from(px[1]), u16::from(a)),
        mul_div255(u16::from(px[2]), u16::from(a)),
        a,
    ]
}

fn unpremultiply(px: PremulRgba8) -> [u8; 4] {
    let a = px[3];
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let un = |c: u8| ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8;
    [un(px[0]), un(px[1]), un(px[2]), a]
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/backend/memory.rs"]
mod tests;
