//! Structured errors (spec.md §7).
//!
//! Component-local recovery (retries, corruption isolation) happens inside
//! each crate using that crate's own `thiserror` enum. Anything that
//! crosses a component boundary gets converted into an [`EngineError`]: a
//! kind tag, a one-line message, and an optional remediation hint.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    TransientBackend,
    PermanentBackend,
    Storage,
    StaleRecord,
    Cancelled,
    QueryTimeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::TransientBackend => "transient_backend_error",
            ErrorKind::PermanentBackend => "permanent_backend_error",
            ErrorKind::Storage => "storage_error",
            ErrorKind::StaleRecord => "stale_record_error",
            ErrorKind::Cancelled => "cancelled_error",
            ErrorKind::QueryTimeout => "query_timeout_error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<String>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn stale_record(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StaleRecord, message)
            .with_hint("run a reconcile pass to rebuild this record")
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation was cancelled")
    }

    pub fn query_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueryTimeout, message)
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::QueryTimeout)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::storage(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::storage(format!("json codec error: {err}"))
    }
}
