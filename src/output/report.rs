use std::fmt;
use std::path::{Path, PathBuf};

/// Category of a per-item problem found while interpreting the layer tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IssueKind {
    InvalidTag,
    InvalidName,
    InvalidNamePattern,
    InvalidScale,
    ReservedSkin,
    SkinPrefix,
    BoneParentConflict,
    DuplicatePlaceholder,
    DefaultSkinCollision,
    MissingMeshSource,
    NotAMesh,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    /// User-facing text; paragraphs separated by blank lines.
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Issues accumulated over one run, in discovery order.
#[derive(Clone, Debug, Default)]
pub struct IssueLog {
    issues: Vec<Issue>,
}

impl IssueLog {
    pub fn push(&mut self, kind: IssueKind, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(?kind, "{}", message.lines().next().unwrap_or_default());
        self.issues.push(Issue { kind, message });
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn into_vec(self) -> Vec<Issue> {
        self.issues
    }
}

/// Every issue of a rejected run, plus where the full list was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorReport {
    pub issues: Vec<Issue>,
    /// Set once the error log was written.
    pub log_path: Option<PathBuf>,
    /// Set when writing the error log failed.
    pub log_error: Option<String>,
}

impl ErrorReport {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            log_path: None,
            log_error: None,
        }
    }

    /// Write `errors.txt` at `path` when there is more than one issue.
    pub fn write_log(&mut self, path: &Path) {
        if self.issues.len() < 2 {
            return;
        }
        let written = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(path, render_log(&self.issues)));
        match written {
            Ok(()) => self.log_path = Some(path.to_path_buf()),
            Err(e) => {
                tracing::warn!(path = %path.display(), "unable to write error log: {e}");
                self.log_error = Some(e.to_string());
            }
        }
    }

    /// The first issue, plus a pointer to the error log when there are more.
    pub fn summary(&self) -> String {
        let Some(first) = self.issues.first() else {
            return String::new();
        };
        let extra = self.issues.len() - 1;
        let mut out = first.message.clone();
        if extra == 0 {
            return out;
        }
        let noun = if extra == 1 { "error" } else { "errors" };
        match &self.log_error {
            Some(e) => out.push_str(&format!(
                "\n\nUnable to write {extra} additional {noun} to errors.txt.\n{e}"
            )),
            None => out.push_str(&format!("\n\nSee errors.txt for {extra} additional {noun}.")),
        }
        out
    }
}

/// Error log text: entries separated by `---`, blank lines collapsed.
pub fn render_log(issues: &[Issue]) -> String {
    let mut out = String::new();
    for (i, issue) in issues.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&issue.message.replace("\n\n", "\n"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/output/report.rs"]
mod tests;
