//! Inline `[directive]` / `[directive:value]` tags embedded in layer and group names.
//!
//! A name is tokenized once into a [`TagList`]; every later pass (legality checks, ancestor
//! resolution, naming) reads that list instead of re-scanning the name.

use std::fmt;

/// Whether a node is a group or a leaf layer. Tag legality depends on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// A layer group (folder in the layers panel).
    Group,
    /// A leaf layer.
    Layer,
}

impl NodeRole {
    fn plural(self) -> &'static str {
        match self {
            Self::Group => "groups",
            Self::Layer => "layers",
        }
    }
}

/// Recognized directive keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagKind {
    Bone,
    Slot,
    Skin,
    Folder,
    Ignore,
    Overlay,
    Trim,
    Mesh,
    Merge,
    Path,
    Scale,
    Name,
}

impl TagKind {
    pub const ALL: [TagKind; 12] = [
        Self::Bone,
        Self::Slot,
        Self::Skin,
        Self::Folder,
        Self::Ignore,
        Self::Overlay,
        Self::Trim,
        Self::Mesh,
        Self::Merge,
        Self::Path,
        Self::Scale,
        Self::Name,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Bone => "bone",
            Self::Slot => "slot",
            Self::Skin => "skin",
            Self::Folder => "folder",
            Self::Ignore => "ignore",
            Self::Overlay => "overlay",
            Self::Trim => "trim",
            Self::Mesh => "mesh",
            Self::Merge => "merge",
            Self::Path => "path",
            Self::Scale => "scale",
            Self::Name => "name",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }

    /// Whether the directive may appear on a node with `role`.
    pub fn allowed_on(self, role: NodeRole) -> bool {
        match self {
            Self::Bone | Self::Slot | Self::Skin | Self::Folder | Self::Ignore => true,
            Self::Merge | Self::Name => role == NodeRole::Group,
            Self::Overlay | Self::Trim | Self::Mesh | Self::Path | Self::Scale => {
                role == NodeRole::Layer
            }
        }
    }

    /// `[path:x]`, `[scale:x]` and `[name:x]` are meaningless without a value.
    pub fn requires_value(self) -> bool {
        matches!(self, Self::Path | Self::Scale | Self::Name)
    }

    /// `[ignore]`, `[overlay]` and `[merge]` are flags and take no value.
    pub fn accepts_value(self) -> bool {
        !matches!(self, Self::Ignore | Self::Overlay | Self::Merge)
    }

    /// Inherited directives resolve to the nearest enclosing declaration; the others apply
    /// to the tagged node only.
    pub fn is_inherited(self) -> bool {
        matches!(
            self,
            Self::Bone | Self::Slot | Self::Skin | Self::Folder | Self::Name
        )
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One bracketed token from a name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    /// Text between the brackets, verbatim.
    pub raw: String,
    /// `None` when the token is not a well-formed directive.
    pub kind: Option<TagKind>,
    /// Trimmed text after the first `:`, if non-empty.
    pub value: Option<String>,
}

impl Tag {
    fn parse(raw: &str) -> Self {
        let (keyword, value) = match raw.split_once(':') {
            Some((k, v)) => (k, Some(v.trim()).filter(|v| !v.is_empty())),
            None => (raw, None),
        };
        let has_colon = raw.contains(':');

        let kind = TagKind::from_keyword(keyword).filter(|k| {
            if has_colon {
                k.accepts_value() && (value.is_some() || !k.requires_value())
            } else {
                !k.requires_value()
            }
        });

        Self {
            raw: raw.to_owned(),
            kind,
            value: value.map(str::to_owned),
        }
    }

    /// Whether this token is a directive legal on a node with `role`.
    pub fn is_legal_on(&self, role: NodeRole) -> bool {
        self.kind.is_some_and(|k| k.allowed_on(role))
    }
}

/// Why a name was rejected by [`TagList::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagViolation {
    /// The offending token (text between brackets).
    pub tag: String,
    /// Role of the node carrying the name.
    pub role: NodeRole,
    /// Set when the directive is valid, just not for this role.
    pub valid_for: Option<NodeRole>,
}

impl TagViolation {
    /// Human-readable message naming the node and what the tag is restricted to.
    pub fn describe(&self, name: &str) -> String {
        let what = match self.role {
            NodeRole::Group => "group",
            NodeRole::Layer => "layer",
        };
        let reason = match self.valid_for {
            Some(other) => format!(
                "The [{}] tag is only valid for {}, not for {}.",
                self.tag,
                other.plural(),
                self.role.plural()
            ),
            None => format!("The [{}] tag is not a valid tag.", self.tag),
        };
        format!("Invalid {what} name:\n\n{name}\n\n{reason}")
    }
}

/// Tokenized directives of one name, in order of appearance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagList {
    tags: Vec<Tag>,
}

impl TagList {
    /// Extract every `[...]` token from `name`.
    pub fn parse(name: &str) -> Self {
        let tags = bracket_spans(name)
            .map(|(start, end)| Tag::parse(&name[start + 1..end - 1]))
            .collect();
        Self { tags }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// First well-formed occurrence of `kind`.
    pub fn get(&self, kind: TagKind) -> Option<&Tag> {
        self.tags.iter().find(|t| t.kind == Some(kind))
    }

    pub fn has(&self, kind: TagKind) -> bool {
        self.get(kind).is_some()
    }

    /// Explicit value of the first `kind` directive.
    pub fn value(&self, kind: TagKind) -> Option<&str> {
        self.get(kind).and_then(|t| t.value.as_deref())
    }

    /// First of `kinds` to appear in the name.
    pub fn first_of(&self, kinds: &[TagKind]) -> Option<&Tag> {
        self.tags
            .iter()
            .find(|t| t.kind.is_some_and(|k| kinds.contains(&k)))
    }

    /// Reject the first token that is not legal for `role`.
    pub fn check(&self, role: NodeRole) -> Result<(), TagViolation> {
        let Some(bad) = self.tags.iter().find(|t| !t.is_legal_on(role)) else {
            return Ok(());
        };
        let other = match role {
            NodeRole::Group => NodeRole::Layer,
            NodeRole::Layer => NodeRole::Group,
        };
        Err(TagViolation {
            tag: bad.raw.clone(),
            role,
            valid_for: bad.is_legal_on(other).then_some(other),
        })
    }
}

/// Remove every bracketed token from `name` and trim the rest.
pub fn strip_tags(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut cursor = 0;
    for (start, end) in bracket_spans(name) {
        out.push_str(&name[cursor..start]);
        cursor = end;
    }
    out.push_str(&name[cursor..]);
    out.trim().to_owned()
}

/// Byte spans `[start, end)` of `[...]` tokens with a non-empty body.
fn bracket_spans(name: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    let bytes = name.as_bytes();
    let mut i = 0usize;
    std::iter::from_fn(move || {
        while i < bytes.len() {
            if bytes[i] != b'[' {
                i += 1;
                continue;
            }
            let start = i;
            match bytes[start + 1..].iter().position(|&b| b == b']') {
                Some(0) => i = start + 1,
                Some(len) => {
                    let end = start + 1 + len + 1;
                    i = end;
                    return Some((start, end));
                }
                None => i = bytes.len(),
            }
        }
        None
    })
}

#[cfg(test)]
#[path = "../tests/unit/tags.rs"]
mod tests;
