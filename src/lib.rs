#![forbid(unsafe_code)]
//! Compile a tagged layer tree into a Spine skeleton document and per-attachment PNG images.
//!
//! Layer and group names carry `[directive]` tags that assign layers to bones, slots and
//! skins. [`Exporter`] drives a run against any [`DocumentBackend`]; [`MemoryDocument`] is an
//! in-memory backend loadable from JSON.

pub mod backend;
pub mod export;
pub mod foundation;
pub mod output;
pub mod session;
pub mod settings;
pub mod skeleton;
pub mod tags;
pub mod tree;

pub use backend::{DocumentBackend, MemoryDocument};
pub use foundation::cancel::CancelToken;
pub use foundation::error::{ExportError, ExportResult};
pub use foundation::progress::{ProgressObserver, ProgressUpdate, Stage};
pub use output::{ErrorReport, Issue, IssueKind};
pub use session::{ExportSummary, Exporter, RunOutcome};
pub use settings::{JsonFormat, Settings};
