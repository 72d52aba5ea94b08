use crate::backend::{BlendMode, DocumentBackend, LayerKind, Section};
use crate::foundation::core::{LayerId, Rect};
use crate::foundation::error::{ExportError, ExportResult};
use crate::tags::{NodeRole, TagKind, TagList, strip_tags};

/// Index of a node in a [`LayerTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One group or leaf layer, with its name tokenized once at build time.
#[derive(Clone, Debug)]
pub struct LayerNode {
    pub layer: LayerId,
    pub parent: Option<NodeId>,
    /// Top to bottom.
    pub children: Vec<NodeId>,
    /// Raw display name, tags included.
    pub name: String,
    pub tags: TagList,
    pub role: NodeRole,
    /// Selected by the user, directly or through an ancestor.
    pub selected: bool,
    pub visible: bool,
    pub locked: bool,
    pub background: bool,
    pub clipping: bool,
    pub blend: BlendMode,
    pub kind: LayerKind,
    bounds: Option<Rect>,
}

/// Arena of the document's groups and layers. Navigation goes through parent indices.
#[derive(Clone, Debug, Default)]
pub struct LayerTree {
    nodes: Vec<LayerNode>,
    roots: Vec<NodeId>,
}

impl LayerTree {
    /// Read the backend's layer stack top to bottom. With `selection`, nodes listed there and
    /// their descendants are marked selected.
    pub fn build<B: DocumentBackend + ?Sized>(
        backend: &B,
        selection: Option<&[LayerId]>,
    ) -> ExportResult<Self> {
        let mut tree = Self::default();
        let mut open: Vec<NodeId> = Vec::new();

        for index in (0..backend.layer_count()?).rev() {
            let layer = backend.layer_at(index)?;
            let info = backend.layer_info(layer)?;
            let role = match info.section {
                Section::GroupEnd => {
                    open.pop().ok_or_else(|| {
                        ExportError::backend(format!("group end {layer} without a group"))
                    })?;
                    continue;
                }
                Section::GroupStart => NodeRole::Group,
                Section::Content => NodeRole::Layer,
            };

            let parent = open.last().copied();
            let inherited = parent.is_some_and(|p| tree.node(p).selected);
            let id = NodeId(tree.nodes.len() as u32);
            tree.nodes.push(LayerNode {
                layer,
                parent,
                children: Vec::new(),
                tags: TagList::parse(&info.name),
                name: info.name,
                role,
                selected: inherited || selection.is_some_and(|s| s.contains(&layer)),
                visible: info.visible,
                locked: info.locked,
                background: info.background,
                clipping: info.clipping,
                blend: info.blend,
                kind: info.kind,
                bounds: None,
            });
            match parent {
                Some(p) => tree.nodes[p.index()].children.push(id),
                None => tree.roots.push(id),
            }
            if role == NodeRole::Group {
                open.push(id);
            }
        }
        Ok(tree)
    }

    pub fn node(&self, id: NodeId) -> &LayerNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut LayerNode {
        &mut self.nodes[id.index()]
    }

    /// Top-level nodes, top to bottom.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `id` followed by its ancestors, innermost first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), |&n| self.node(n).parent)
    }

    /// Node declaring `kind` for `id`: the nearest declaring ancestor for inherited directives,
    /// `id` itself otherwise. Declarations illegal for the declaring node's role are ignored.
    pub fn find_tag(&self, id: NodeId, kind: TagKind) -> Option<NodeId> {
        let declares = |n: NodeId| {
            let node = self.node(n);
            kind.allowed_on(node.role) && node.tags.has(kind)
        };
        if kind.is_inherited() {
            self.ancestors(id).find(|&n| declares(n))
        } else {
            declares(id).then_some(id)
        }
    }

    /// Value of `id`'s own `kind` directive, defaulting to its stripped name.
    pub fn tag_value(&self, id: NodeId, kind: TagKind) -> String {
        let node = self.node(id);
        match node.tags.value(kind) {
            Some(v) => v.to_owned(),
            None => strip_tags(&node.name),
        }
    }

    /// [`Self::find_tag`] followed by [`Self::tag_value`].
    pub fn find_tag_value(&self, id: NodeId, kind: TagKind) -> Option<String> {
        self.find_tag(id, kind).map(|n| self.tag_value(n, kind))
    }

    /// Raw names from the outermost ancestor down to `id`, joined with `/`.
    pub fn display_path(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .map(|n| self.node(n).name.as_str())
            .collect();
        names.reverse();
        names.join("/")
    }

    /// Folder prefix contributed by `[folder]` and `[skin]` directives on `id` and its ancestors,
    /// ending in `/` unless empty.
    ///
    /// The directive appearing first in a name wins for that node. A value starting with `/` is
    /// absolute and ends the walk; a skin named `default` contributes nothing.
    pub fn folder_prefix(&self, id: NodeId) -> String {
        let mut segments: Vec<String> = Vec::new();
        for n in self.ancestors(id) {
            let node = self.node(n);
            let Some(kind) = node
                .tags
                .first_of(&[TagKind::Folder, TagKind::Skin])
                .and_then(|t| t.kind)
            else {
                continue;
            };
            let value = self.tag_value(n, kind);
            if kind == TagKind::Skin && value == "default" {
                continue;
            }
            if let Some(absolute) = value.strip_prefix('/') {
                segments.push(absolute.to_owned());
                break;
            }
            segments.push(value);
        }
        segments
            .iter()
            .rev()
            .map(|s| format!("{s}/"))
            .collect()
    }

    /// Wrap `name` in every enclosing `[name:prefix*suffix]` pattern, nearest first.
    ///
    /// Returns the declaring node when a pattern has no `*`.
    pub fn apply_name_patterns(&self, id: NodeId, name: &str) -> Result<String, NodeId> {
        let mut name = name.to_owned();
        let mut from = Some(id);
        while let Some(start) = from {
            let Some(holder) = self.find_tag(start, TagKind::Name) else {
                break;
            };
            let pattern = self.node(holder).tags.value(TagKind::Name).unwrap_or_default();
            let Some((prefix, suffix)) = pattern.split_once('*') else {
                return Err(holder);
            };
            name = format!("{prefix}{name}{suffix}");
            from = self.node(holder).parent;
        }
        Ok(name)
    }

    /// Tight bounds of `id`, measured once and cached until [`Self::invalidate_bounds`].
    pub fn bounds<B: DocumentBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: NodeId,
    ) -> ExportResult<Rect> {
        let node = self.node_mut(id);
        if let Some(r) = node.bounds {
            return Ok(r);
        }
        let r = backend.bounds(node.layer)?;
        node.bounds = Some(r);
        Ok(r)
    }

    pub fn invalidate_bounds(&mut self, id: NodeId) {
        self.node_mut(id).bounds = None;
    }

    pub fn set_visible<B: DocumentBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: NodeId,
        visible: bool,
    ) -> ExportResult<()> {
        let node = self.node_mut(id);
        if node.visible == visible {
            return Ok(());
        }
        backend.set_visible(node.layer, visible)?;
        node.visible = visible;
        Ok(())
    }

    pub fn show<B: DocumentBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: NodeId,
    ) -> ExportResult<()> {
        self.set_visible(backend, id, true)
    }

    pub fn hide<B: DocumentBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: NodeId,
    ) -> ExportResult<()> {
        self.set_visible(backend, id, false)
    }

    pub fn unlock<B: DocumentBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: NodeId,
    ) -> ExportResult<()> {
        let node = self.node_mut(id);
        if !node.locked {
            return Ok(());
        }
        backend.set_locked(node.layer, false)?;
        node.locked = false;
        Ok(())
    }

    /// Re-read the layer kind after asking the backend to rasterize it.
    pub fn rasterize<B: DocumentBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: NodeId,
    ) -> ExportResult<LayerKind> {
        let layer = self.node(id).layer;
        backend.rasterize(layer)?;
        let kind = backend.layer_info(layer)?.kind;
        self.node_mut(id).kind = kind;
        Ok(kind)
    }

    /// Flatten a group into one pixel layer. Tags resolved for the node stay valid.
    pub fn flatten<B: DocumentBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: NodeId,
    ) -> ExportResult<()> {
        let layer = self.node(id).layer;
        backend.select(layer, false)?;
        let merged = backend.merge_selected()?;
        let node = self.node_mut(id);
        node.layer = merged;
        node.kind = LayerKind::Pixel;
        node.bounds = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tree/arena.rs"]
mod tests;
