//! Error types for monodev
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad identifier, unknown store, missing repo)
//! - 3: Blocked (overlay conflicts, mode mismatch)
//! - 4: Operation failed (io error, corrupt state)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the monodev CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for monodev operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid relative path: {0}")]
    InvalidRelPath(String),

    #[error("Repository not found from {0}")]
    RepoNotFound(PathBuf),

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Store already exists: {0}")]
    StoreAlreadyExists(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("No active store for this workspace")]
    NoActiveStore,

    #[error("Source path missing: {0}")]
    SourceMissing(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Blocked (exit code 3)
    #[error("Overlay conflicts detected: {} path(s)", plan.conflicts.len())]
    Conflicts {
        /// The full plan, so callers can show what was refused.
        plan: Box<crate::planner::ApplyPlan>,
    },

    #[error("Overlay mode mismatch: workspace is {recorded}, requested {requested}")]
    ModeMismatch { recorded: String, requested: String },

    #[error("On-disk state for {path} does not match recorded overlay ({expected})")]
    StateMismatch { path: String, expected: String },

    #[error("Workspace has applied overlays; unapply first or pass --force")]
    WorkspaceBusy,

    // Operation failures (exit code 4)
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Corrupt state in {path}: {reason}")]
    StateCorrupt { path: PathBuf, reason: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Wrap an io error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::InvalidIdentifier(_)
            | Error::InvalidRelPath(_)
            | Error::RepoNotFound(_)
            | Error::StoreNotFound(_)
            | Error::StoreAlreadyExists(_)
            | Error::WorkspaceNotFound(_)
            | Error::NoActiveStore
            | Error::SourceMissing(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_) => exit_codes::USER_ERROR,

            // Blocked
            Error::Conflicts { .. }
            | Error::ModeMismatch { .. }
            | Error::StateMismatch { .. }
            | Error::WorkspaceBusy => exit_codes::BLOCKED,

            // Operation failures
            Error::Io { .. }
            | Error::Git(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::StateCorrupt { .. }
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output.
    pub fn details(&self) -> Option<serde_json::Value> {
        use serde_json::json;

        let path_value = |path: &PathBuf| json!({ "path": path.display().to_string() });
        let mut details = match self {
            Error::InvalidIdentifier(id) => Some(json!({ "identifier": id })),
            Error::InvalidRelPath(path) => Some(json!({ "path": path })),
            Error::RepoNotFound(path) => Some(path_value(path)),
            Error::StoreNotFound(id) => Some(json!({ "store": id })),
            Error::StoreAlreadyExists(id) => Some(json!({ "store": id })),
            Error::WorkspaceNotFound(id) => Some(json!({ "workspace": id })),
            Error::NoActiveStore => None,
            Error::SourceMissing(path) => Some(path_value(path)),
            Error::InvalidArgument(message) => Some(json!({ "message": message })),
            Error::InvalidConfig(message) => Some(json!({ "message": message })),
            Error::Conflicts { plan } => Some(json!({
                "count": plan.conflicts.len(),
                "plan": serde_json::to_value(plan.as_ref()).unwrap_or_default(),
            })),
            Error::ModeMismatch {
                recorded,
                requested,
            } => Some(json!({ "recorded": recorded, "requested": requested })),
            Error::StateMismatch { path, expected } => {
                Some(json!({ "path": path, "expected": expected }))
            }
            Error::WorkspaceBusy => None,
            Error::Io { path, source } => Some(json!({
                "path": path.display().to_string(),
                "message": source.to_string(),
                "kind": source.kind().to_string(),
            })),
            Error::Git(err) => Some(json!({
                "message": err.message(),
                "code": format!("{:?}", err.code()),
            })),
            Error::Json(err) => Some(json!({ "message": err.to_string() })),
            Error::TomlParse(err) => Some(json!({ "message": err.to_string() })),
            Error::TomlSerialize(err) => Some(json!({ "message": err.to_string() })),
            Error::StateCorrupt { path, reason } => Some(json!({
                "path": path.display().to_string(),
                "reason": reason,
            })),
            Error::OperationFailed(message) => Some(json!({ "message": message })),
        };

        let sources = error_sources(self);
        if !sources.is_empty() {
            if let Some(value) = details.as_mut() {
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("sources".to_string(), json!(sources));
                }
            }
        }

        details
    }
}

/// Result type alias for monodev operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}

fn error_sources(err: &dyn std::error::Error) -> Vec<String> {
    use std::error::Error as StdError;

    let mut sources = Vec::new();
    let mut current = StdError::source(err);
    while let Some(source) = current {
        sources.push(source.to_string());
        current = StdError::source(source);
    }
    sources
}
