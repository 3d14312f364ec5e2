//! Error taxonomy for the vex compiler.
//!
//! Per-module failures during a multi-module pass are caught at the pipeline
//! boundary and reported per path; see `vex::process_files`.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VexError {
    /// A referenced module path is unknown to the source registry.
    #[error("module not registered: {}", .0.display())]
    NotFound(PathBuf),

    /// The module body threw during sandboxed execution.
    #[error("execution of {} failed: {message}", .path.display())]
    Execution { path: PathBuf, message: String },

    /// CSS serialization referenced a class name that was never registered.
    #[error("unresolved class name '{name}' in selector '{selector}'")]
    UnresolvedClassName { name: String, selector: String },

    /// A style record's originating scope has no corresponding registered
    /// module when computing cross-module style imports.
    #[error("no registered module for scope '{0}'")]
    ScopeNotFound(String),

    /// A selector in a `selectors` block was structurally invalid.
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    /// A style rule could not be rendered to CSS.
    #[error("cannot serialize style rule: {0}")]
    Serialize(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl VexError {
    pub fn execution(path: &Path, message: impl Into<String>) -> Self {
        VexError::Execution {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        VexError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VexError>;
