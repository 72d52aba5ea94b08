use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::foundation::error::{ExportError, ExportResult};

/// Largest accepted global scale factor.
pub const MAX_SCALE: f64 = 4.0;

/// Shape of the `"skins"` block in the skeleton JSON.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonFormat {
    /// `"skins": { "<skin>": { "<slot>": { ... } } }`
    #[default]
    Legacy,
    /// `"skins": [ { "name": "<skin>", "attachments": { ... } } ]`
    Current,
}

/// Run configuration. Keys mirror the exporter's persisted preference names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Settings {
    pub ignore_hidden_layers: bool,
    pub ignore_background: bool,
    pub write_template: bool,
    pub write_json: bool,
    pub trim_whitespace: bool,
    pub selection_only: bool,
    /// Global scale, `0 < scale <= 4`.
    pub scale: f64,
    /// Transparent pixels added on every side of each image.
    pub padding: u32,
    /// Image output folder; empty disables image output.
    pub images_dir: String,
    /// JSON output file (when ending in `.json`) or folder; empty disables JSON output.
    pub json_path: String,
    pub format: JsonFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore_hidden_layers: false,
            ignore_background: true,
            write_template: false,
            write_json: true,
            trim_whitespace: true,
            selection_only: false,
            scale: 1.0,
            padding: 1,
            images_dir: "./images/".to_owned(),
            json_path: "./".to_owned(),
            format: JsonFormat::Legacy,
        }
    }
}

/// Absolute output locations for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    /// Folder receiving attachment PNGs and the template image, if image output is enabled.
    pub images_dir: Option<PathBuf>,
    /// Skeleton JSON file, if JSON output is enabled.
    pub json_file: Option<PathBuf>,
    /// `errors.txt` location, next to the JSON output.
    pub error_log: PathBuf,
}

impl Settings {
    pub fn from_reader<R: std::io::Read>(r: R) -> ExportResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| ExportError::validation(format!("parse settings JSON: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ExportResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            ExportError::validation(format!("open settings JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn validate(&self) -> ExportResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 || self.scale > MAX_SCALE {
            return Err(ExportError::validation(format!(
                "scale must be in (0, {MAX_SCALE}], got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Whether the run produces any output besides the optional template image.
    pub fn has_outputs(&self) -> bool {
        !self.images_dir.trim().is_empty() || !self.json_path.trim().is_empty()
    }

    /// Resolve output locations against the source document's folder and name.
    pub fn output_paths(&self, doc_folder: &Path, doc_name: &str) -> OutputPaths {
        let images_dir = resolve_dir(&self.images_dir, doc_folder);

        let json_setting = normalize(&self.json_path);
        let json_target = if json_setting.is_empty() {
            None
        } else if json_setting.ends_with(".json") {
            let (dir, file) = match json_setting.rfind('/') {
                Some(i) => (&json_setting[..=i], &json_setting[i + 1..]),
                None => ("./", json_setting.as_str()),
            };
            Some(
                resolve_dir(dir, doc_folder)
                    .unwrap_or_else(|| doc_folder.to_path_buf())
                    .join(file),
            )
        } else {
            resolve_dir(&json_setting, doc_folder)
                .map(|dir| dir.join(format!("{}.json", document_base_name(doc_name))))
        };

        let error_log = json_target
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| doc_folder.to_path_buf())
            .join("errors.txt");

        OutputPaths {
            images_dir,
            json_file: json_target.filter(|_| self.write_json),
            error_log,
        }
    }
}

/// Document name up to its first `.`.
pub fn document_base_name(doc_name: &str) -> &str {
    doc_name.split('.').next().unwrap_or(doc_name)
}

fn normalize(path: &str) -> String {
    path.trim().replace('\\', "/")
}

fn resolve_dir(raw: &str, doc_folder: &Path) -> Option<PathBuf> {
    let raw = normalize(raw);
    if raw.is_empty() {
        return None;
    }
    if is_absolute(&raw) {
        return Some(PathBuf::from(raw));
    }
    let rel = raw.strip_prefix("./").unwrap_or(&raw);
    Some(doc_folder.join(rel))
}

fn is_absolute(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    raw.starts_with('/')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
        || Path::new(raw).is_absolute()
}

#[cfg(test)]
#[path = "../tests/unit/settings.rs"]
mod tests;
