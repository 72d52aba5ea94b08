use indexmap::IndexMap;

use crate::export::geometry::AttachmentGeometry;
use crate::skeleton::bones::{BoneGraph, BoneId};
use crate::tree::NodeId;

/// Name of the skin every untagged layer belongs to.
pub const DEFAULT_SKIN: &str = "default";

/// Mesh role of an attachment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MeshLink {
    /// Plain region attachment.
    #[default]
    None,
    /// `[mesh]`: a standalone rectangle mesh.
    Source,
    /// `[mesh:name]`: shares the geometry of the mesh attachment `name` in the same slot.
    /// `source` is filled in by validation.
    Linked { name: String, source: Option<usize> },
}

impl MeshLink {
    pub fn is_mesh(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Slot blend modes representable in the skeleton JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotBlend {
    Additive,
    Multiply,
    Screen,
}

impl SlotBlend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Additive => "additive",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
        }
    }
}

/// A collected layer with every name and membership resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLayer {
    pub node: NodeId,
    /// Raw names from the outermost group down, for messages.
    pub path: String,
    /// Slot-relative, folder-qualified attachment name.
    pub attachment_name: String,
    /// Image path relative to the images folder, without extension.
    pub attachment_path: String,
    /// Attachment name with the skin prefix removed.
    pub placeholder_name: String,
    pub slot_name: String,
    pub skin_name: String,
    /// Per-layer `[scale:]` factor.
    pub scale: f64,
    /// Per-layer `[trim]` override.
    pub trim: Option<bool>,
    pub mesh: MeshLink,
    pub overlays: Vec<NodeId>,
    pub was_visible: bool,
    /// Filled in by the export driver for layers with non-empty bounds.
    pub geometry: Option<AttachmentGeometry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub name: String,
    /// `None` means the root bone.
    pub bone: Option<BoneId>,
    /// Default visible placeholder.
    pub attachment: Option<String>,
    pub blend: Option<SlotBlend>,
    pub has_attachments: bool,
    /// Attachment name to layer index. A later layer with the same name replaces the earlier.
    pub layers: IndexMap<String, usize>,
    /// Skin name to placeholder name to layer indices.
    pub placeholders: IndexMap<String, IndexMap<String, Vec<usize>>>,
}

impl Slot {
    pub fn new(name: impl Into<String>, bone: Option<BoneId>) -> Self {
        Self {
            name: name.into(),
            bone,
            attachment: None,
            blend: None,
            has_attachments: false,
            layers: IndexMap::new(),
            placeholders: IndexMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skin {
    pub name: String,
    /// Slot name to layer indices, in paint order.
    pub slots: IndexMap<String, Vec<usize>>,
}

/// Output of the resolve and validate passes; geometry is attached during export.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub bones: BoneGraph,
    /// In first-seen order.
    pub slots: IndexMap<String, Slot>,
    /// In first-seen order; the default skin is always first.
    pub skins: IndexMap<String, Skin>,
    pub layers: Vec<ResolvedLayer>,
}

impl Default for Skeleton {
    fn default() -> Self {
        let mut skins = IndexMap::new();
        skins.insert(
            DEFAULT_SKIN.to_owned(),
            Skin {
                name: DEFAULT_SKIN.to_owned(),
                slots: IndexMap::new(),
            },
        );
        Self {
            bones: BoneGraph::new(),
            slots: IndexMap::new(),
            skins,
            layers: Vec::new(),
        }
    }
}

impl Skeleton {
    /// Layers that produced an attachment.
    pub fn attachment_count(&self) -> usize {
        self.layers.iter().filter(|l| l.geometry.is_some()).count()
    }

    /// Slots with at least one attachment.
    pub fn exported_slot_count(&self) -> usize {
        self.slots.values().filter(|s| s.has_attachments).count()
    }
}
