pub mod json;
pub mod report;

pub use report::{ErrorReport, Issue, IssueKind, IssueLog};
