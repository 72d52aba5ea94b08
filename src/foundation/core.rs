pub use kurbo::{Point, Rect, Vec2};

/// Stable identity of a layer, group, or group-end marker inside a document backend.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct LayerId(pub u32);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Return `true` when `r` encloses no pixels (zero or negative width or height).
pub fn is_degenerate(r: Rect) -> bool {
    !(r.width() > 0.0 && r.height() > 0.0)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
