pub mod driver;
pub mod geometry;

pub use geometry::{AttachmentGeometry, ImagePlan, Placement};
