//! Arena view of the backend's layer stack and the filtering walk over it.

pub mod arena;
pub mod walk;

pub use arena::{LayerNode, LayerTree, NodeId};
pub use walk::CollectedLayer;
