pub type ExportResult<T> = Result<T, ExportError>;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serde(String),

    /// The run observed its cancellation token. Never surfaced by [`crate::Exporter::run`],
    /// which maps it to [`crate::RunOutcome::Cancelled`].
    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
