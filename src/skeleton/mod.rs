//! Bones, slots and skins derived from the collected layers.

pub mod bones;
pub mod model;
pub mod resolve;
pub mod validate;

pub use bones::{Bone, BoneGraph, BoneId};
pub use model::{MeshLink, ResolvedLayer, Skeleton, Skin, Slot, SlotBlend};
