use indexmap::IndexMap;

use crate::foundation::core::{Point, Vec2};
use crate::output::report::{IssueKind, IssueLog};
use crate::tags::TagKind;
use crate::tree::{LayerTree, NodeId};

/// Name of the implicit root bone.
pub const ROOT_BONE: &str = "root";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(pub(crate) u32);

impl BoneId {
    pub const ROOT: BoneId = BoneId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<BoneId>,
    /// Document-relative anchor in output units; `None` until a layer positions it.
    pub position: Option<Point>,
    pub children: Vec<BoneId>,
    /// Node that declared the bone. `None` for the root.
    pub node: Option<NodeId>,
}

/// Bones keyed by name, rooted at a synthetic `root` bone anchored at the ruler origin.
#[derive(Clone, Debug, PartialEq)]
pub struct BoneGraph {
    bones: Vec<Bone>,
    by_name: IndexMap<String, BoneId>,
}

impl Default for BoneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::len_without_is_empty)]
impl BoneGraph {
    pub fn new() -> Self {
        let mut by_name = IndexMap::new();
        by_name.insert(ROOT_BONE.to_owned(), BoneId::ROOT);
        Self {
            bones: vec![Bone {
                name: ROOT_BONE.to_owned(),
                parent: None,
                position: Some(Point::ZERO),
                children: Vec::new(),
                node: None,
            }],
            by_name,
        }
    }

    pub fn get(&self, id: BoneId) -> &Bone {
        &self.bones[id.index()]
    }

    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.by_name.get(name).copied()
    }

    /// Number of bones. The root is always present.
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    /// Resolve the bone declared by `bone_node`, creating it and any missing ancestor bones.
    ///
    /// Returns `None` after recording an issue when a bone of the same name already exists
    /// under a different parent, or when a name repeats along the chain being created. The
    /// graph is left untouched in that case.
    pub fn resolve(
        &mut self,
        tree: &LayerTree,
        bone_node: NodeId,
        issues: &mut IssueLog,
    ) -> Option<BoneId> {
        let name = tree.tag_value(bone_node, TagKind::Bone);
        let (anchor, missing) = self.unresolved_ancestors(tree, bone_node);

        if let Some(existing) = self.find(&name) {
            let bone = self.get(existing);
            if missing.is_empty() && bone.parent == Some(anchor) {
                return Some(existing);
            }
            let first = bone
                .node
                .map(|n| tree.display_path(n))
                .unwrap_or_else(|| ROOT_BONE.to_owned());
            push_conflict(issues, &name, &first, &tree.display_path(bone_node));
            return None;
        }

        // Innermost first.
        let mut chain = vec![(bone_node, name)];
        chain.extend(missing);
        for (i, (inner, inner_name)) in chain.iter().enumerate() {
            if let Some((outer, _)) = chain[i + 1..].iter().find(|(_, n)| n == inner_name) {
                push_conflict(
                    issues,
                    inner_name,
                    &tree.display_path(*outer),
                    &tree.display_path(*inner),
                );
                return None;
            }
        }

        let mut parent = anchor;
        for (n, name) in chain.into_iter().rev() {
            if n != bone_node {
                tracing::debug!(bone = %name, "creating pass-through bone");
            }
            parent = self.insert(name, parent, Some(n));
        }
        Some(parent)
    }

    /// Nearest existing bone enclosing `node`'s parent, plus the `[bone]` groups between them
    /// that have no bone yet, innermost first.
    fn unresolved_ancestors(
        &self,
        tree: &LayerTree,
        node: NodeId,
    ) -> (BoneId, Vec<(NodeId, String)>) {
        let enclosing = |n: NodeId| {
            tree.node(n)
                .parent
                .and_then(|p| tree.find_tag(p, TagKind::Bone))
        };

        let mut missing = Vec::new();
        let mut cursor = enclosing(node);
        while let Some(n) = cursor {
            let name = tree.tag_value(n, TagKind::Bone);
            if let Some(existing) = self.find(&name) {
                return (existing, missing);
            }
            missing.push((n, name));
            cursor = enclosing(n);
        }
        (BoneId::ROOT, missing)
    }

    fn insert(&mut self, name: String, parent: BoneId, node: Option<NodeId>) -> BoneId {
        let id = BoneId(self.bones.len() as u32);
        self.bones.push(Bone {
            name: name.clone(),
            parent: Some(parent),
            position: None,
            children: Vec::new(),
            node,
        });
        self.bones[parent.index()].children.push(id);
        self.by_name.insert(name, id);
        id
    }

    /// Record the anchor of `id` unless an earlier layer already did.
    pub fn set_position_if_unset(&mut self, id: BoneId, position: Point) {
        let bone = &mut self.bones[id.index()];
        if bone.position.is_none() {
            bone.position = Some(position);
        }
    }

    /// Document-relative anchor. Unpositioned bones sit on their parent's anchor.
    pub fn document_position(&self, id: BoneId) -> Point {
        let mut cursor = Some(id);
        while let Some(b) = cursor {
            let bone = self.get(b);
            if let Some(p) = bone.position {
                return p;
            }
            cursor = bone.parent;
        }
        Point::ZERO
    }

    /// Anchor relative to the parent bone's anchor.
    pub fn local_position(&self, id: BoneId) -> Vec2 {
        let own = self.document_position(id);
        match self.get(id).parent {
            Some(p) => own - self.document_position(p),
            None => own.to_vec2(),
        }
    }

    /// Root first, then children depth-first in creation order.
    pub fn preorder(&self) -> Vec<BoneId> {
        let mut out = Vec::with_capacity(self.bones.len());
        let mut stack = vec![BoneId::ROOT];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.get(id).children.iter().rev().copied());
        }
        out
    }
}

fn push_conflict(issues: &mut IssueLog, name: &str, first: &str, second: &str) {
    issues.push(
        IssueKind::BoneParentConflict,
        format!(
            "Multiple layers for the \"{name}\" bone have different parent bones:\n\n{first}\n{second}"
        ),
    );
}

#[cfg(test)]
#[path = "../../tests/unit/skeleton/bones.rs"]
mod tests;
