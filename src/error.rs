//! Error kinds and the configuration path diagnostic.
//!
//! # Propagation
//! - Read-only queries never fail for a missing path; they answer
//!   false/empty/`None` instead.
//! - Mutating operations fail loudly and leave candidate and running
//!   state exactly as they were before the call.
//! - `Busy` is the only retryable kind.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by configuration store operations.
#[derive(Debug, Error)]
pub enum ConfigdError {
    /// Empty or malformed session id or call argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// Unknown session or schema location.
    #[error("{0}")]
    NotFound(String),

    /// Structural or value schema violation.
    #[error("{0}")]
    InvalidPath(PathDiagnostic),

    /// An external commit action reported failure or timed out.
    #[error("[{path}]\n{output}\n\nCommit failed\n")]
    CommitActionFailed { path: String, output: String },

    /// Another commit holds the running tree.
    #[error("a commit is already in progress, retry later")]
    Busy,

    /// Boot-configuration I/O or parse failure.
    #[error("{path}: {reason}")]
    PersistenceFailed { path: PathBuf, reason: String },
}

/// Result type for configuration store operations.
pub type ConfigdResult<T> = Result<T, ConfigdError>;

/// Wire-level classification of [`ConfigdError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InvalidPath,
    CommitActionFailed,
    Busy,
    PersistenceFailed,
}

impl ConfigdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigdError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ConfigdError::NotFound(_) => ErrorKind::NotFound,
            ConfigdError::InvalidPath(_) => ErrorKind::InvalidPath,
            ConfigdError::CommitActionFailed { .. } => ErrorKind::CommitActionFailed,
            ConfigdError::Busy => ErrorKind::Busy,
            ConfigdError::PersistenceFailed { .. } => ErrorKind::PersistenceFailed,
        }
    }

    /// True when repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConfigdError::Busy)
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        ConfigdError::PersistenceFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn no_session(sid: &str) -> Self {
        ConfigdError::NotFound(format!("session {sid} does not exist"))
    }
}

impl From<PathDiagnostic> for ConfigdError {
    fn from(diag: PathDiagnostic) -> Self {
        ConfigdError::InvalidPath(diag)
    }
}

/// Why a path was rejected by the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Cause {
    /// A segment matches no schema child.
    PathInvalid,
    /// A value failed type or allowed-value checks.
    ValueInvalid { choices: Vec<String> },
    /// The path stops at a node that needs a value or entry key.
    ValueRequired,
    /// A single-value leaf was given a second value.
    ValueConflict,
}

/// Operation named in the last line of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Set,
    Delete,
    Rename,
    Copy,
    Validate,
    Commit,
    Comment,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Set => "Set",
            Operation::Delete => "Delete",
            Operation::Rename => "Rename",
            Operation::Copy => "Copy",
            Operation::Validate => "Validate",
            Operation::Commit => "Commit",
            Operation::Comment => "Comment",
        };
        f.write_str(name)
    }
}

/// Human-readable rejection of a configuration path.
///
/// Renders as:
///
/// ```text
/// Configuration path: <prefix> [<segment>] is not valid
///
/// <cause>
///
/// <operation> failed
/// ```
///
/// The operation block is omitted for pure validation queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDiagnostic {
    pub prefix: Vec<String>,
    pub segment: String,
    pub cause: Cause,
    pub operation: Option<Operation>,
}

impl PathDiagnostic {
    /// Build a diagnostic for the fault found at `index` of `path`.
    ///
    /// An unmatched segment is reported against its parent, the last
    /// segment the schema accepted.
    pub fn at(path: &[String], index: usize, cause: Cause) -> Self {
        let index = index.min(path.len().saturating_sub(1));
        let bracket = match cause {
            Cause::PathInvalid if index > 0 => index - 1,
            _ => index,
        };
        Self {
            prefix: path[..bracket].to_vec(),
            segment: path.get(bracket).cloned().unwrap_or_default(),
            cause,
            operation: None,
        }
    }

    pub fn during(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl fmt::Display for PathDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Configuration path: ")?;
        for seg in &self.prefix {
            write!(f, "{seg} ")?;
        }
        write!(f, "[{}] is not valid\n\n", self.segment)?;

        match &self.cause {
            Cause::PathInvalid => f.write_str("Path is invalid")?,
            Cause::ValueRequired => f.write_str("Node requires a value")?,
            Cause::ValueConflict => f.write_str("Node accepts only one value")?,
            Cause::ValueInvalid { choices } => {
                if !choices.is_empty() {
                    f.write_str("Must be one of the following:\n")?;
                    for choice in choices {
                        writeln!(f, "  {choice}")?;
                    }
                    f.write_str("\n")?;
                }
                f.write_str("Value validation failed")?;
            }
        }
        f.write_str("\n")?;

        if let Some(op) = self.operation {
            write!(f, "\n{op} failed\n")?;
        }
        Ok(())
    }
}
