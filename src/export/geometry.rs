//! Output-space placement of bones and attachments.
//!
//! Output space is y-up, in scaled pixels, with the document ruler origin at `(0, 0)`.

use crate::backend::DocumentInfo;
use crate::foundation::core::{Point, Rect, Vec2};
use crate::settings::Settings;

pub const MESH_UVS: [f64; 8] = [1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
pub const MESH_TRIANGLES: [u32; 6] = [1, 2, 3, 1, 3, 0];
pub const MESH_HULL: u32 = 4;
pub const MESH_EDGES: [u32; 8] = [0, 2, 2, 4, 4, 6, 0, 6];

/// Run-wide inputs to every placement computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub scale: f64,
    pub padding: f64,
    /// Ruler origin in canvas pixels.
    pub origin: Vec2,
    pub doc_width: f64,
    pub doc_height: f64,
}

impl Placement {
    pub fn new(settings: &Settings, info: &DocumentInfo) -> Self {
        Self {
            scale: settings.scale,
            padding: f64::from(settings.padding),
            origin: info.ruler_origin,
            doc_width: f64::from(info.width),
            doc_height: f64::from(info.height),
        }
    }
}

/// Bone anchor for a layer with canvas `bounds`: the center of its box, document-relative.
pub fn bone_anchor(bounds: Rect, p: Placement) -> Point {
    let center = bounds.center();
    Point::new(
        (center.x - p.origin.x) * p.scale,
        (p.origin.y - center.y) * p.scale,
    )
}

/// Placement of one attachment, relative to its slot's bone.
#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentGeometry {
    /// Region center, or mesh top-left corner.
    pub x: f64,
    pub y: f64,
    /// Image size in pixels, padding and per-layer scale included.
    pub width: f64,
    pub height: f64,
    /// Per-layer `[scale:]` factor the image was rendered at.
    pub scale: f64,
    pub mesh: bool,
}

impl AttachmentGeometry {
    /// Corners of the mesh rectangle, counter-clockwise from bottom right.
    pub fn vertices(&self) -> [f64; 8] {
        let (x, y, w, h) = (self.x, self.y, self.width, self.height);
        [x + w, y - h, x, y - h, x, y, x + w, y]
    }
}

/// Host operations that turn the composite into the attachment image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImagePlan {
    /// Canvas region to keep, when trimming.
    pub crop: Option<Rect>,
    /// Resample factor, global scale times layer scale.
    pub resize: f64,
    /// Final canvas size, when padding is added.
    pub canvas: Option<(u32, u32)>,
}

/// Compute the attachment placement and image plan for a layer with canvas `bounds`.
///
/// `bone` is the document-relative anchor of the slot's bone, if the slot has one.
pub fn attachment_frame(
    bounds: Rect,
    trim: bool,
    layer_scale: f64,
    mesh: bool,
    p: Placement,
    bone: Option<Point>,
) -> (AttachmentGeometry, ImagePlan) {
    let s = p.scale;
    let (left, top, w, h, crop) = if trim {
        (bounds.x0 * s, bounds.y0 * s, bounds.width(), bounds.height(), Some(bounds))
    } else {
        (0.0, 0.0, p.doc_width, p.doc_height, None)
    };

    let width = w * s + p.padding * 2.0;
    let height = h * s + p.padding * 2.0;
    let center = if mesh { 0.0 } else { 0.5 };

    let mut x = left + width.round() * center - p.padding - p.origin.x * s;
    let mut y = p.origin.y * s - (top + height.round() * center - p.padding);
    if let Some(anchor) = bone {
        x -= anchor.x;
        y -= anchor.y;
    }

    let out_width = (width * layer_scale).round();
    let out_height = (height * layer_scale).round();
    let canvas = (p.padding > 0.0).then(|| (out_width as u32, out_height as u32));

    (
        AttachmentGeometry {
            x,
            y,
            width: out_width,
            height: out_height,
            scale: layer_scale,
            mesh,
        },
        ImagePlan {
            crop,
            resize: s * layer_scale,
            canvas,
        },
    )
}

#[cfg(test)]
#[path = "../../tests/unit/export/geometry.rs"]
mod tests;
