//! Error types for reading git history.

use thiserror::Error;

/// Result type alias for git operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// Errors that can occur while reading git history.
#[derive(Error, Debug)]
pub enum GitError {
    /// The `git` binary could not be started.
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    /// `git` ran but exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// `git` printed something that is not UTF-8.
    #[error("`{command}` produced non-UTF-8 output")]
    InvalidUtf8 { command: String },
}
