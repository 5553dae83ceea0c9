//! Commit history as embeddable text.
//!
//! Shells out to the `git` binary in a repository directory. Commits come
//! back oldest first, the order `git rev-list --reverse HEAD` prints them.

pub mod error;

use std::path::{Path, PathBuf};
use std::process::Output;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

pub use error::{GitError, Result};

/// The text produced for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitText {
    /// Full commit hash.
    pub sha: String,

    /// Text to embed.
    pub text: String,
}

/// Which parts of a commit go into its text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitTextMode {
    /// Commit message only.
    #[default]
    Message,
    /// Commit message followed by the zero-context diff.
    MessageAndDiff,
}

/// Options for [`CommitSource::collect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectOptions {
    /// Keep only the most recent `limit` commits.
    pub limit: Option<usize>,

    /// What each commit's text contains.
    pub mode: CommitTextMode,
}

/// Reads commits from a repository on disk.
#[derive(Debug, Clone)]
pub struct CommitSource {
    repo_dir: PathBuf,
}

impl CommitSource {
    /// Read history from the repository at `repo_dir`.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    /// The repository directory.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    async fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("Running git {} in {}", args.join(" "), self.repo_dir.display());
        Ok(Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await?)
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let command = format!("git {}", args.join(" "));
        let output = self.output(args).await?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| GitError::InvalidUtf8 { command })
    }

    /// Whether `HEAD` resolves to a commit. False in a repository with no
    /// commits yet; an error outside a repository.
    pub async fn has_head(&self) -> Result<bool> {
        let args = ["rev-parse", "--verify", "--quiet", "HEAD"];
        let output = self.output(&args).await?;
        if output.status.success() {
            return Ok(true);
        }

        // `--quiet` exits 1 with no stderr when HEAD is unborn.
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.code() == Some(1) && stderr.is_empty() {
            return Ok(false);
        }
        Err(GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr,
        })
    }

    /// Every commit reachable from `HEAD`, oldest first. Empty when the
    /// repository has no commits.
    pub async fn commit_ids(&self) -> Result<Vec<String>> {
        if !self.has_head().await? {
            info!("{} has no commits yet", self.repo_dir.display());
            return Ok(Vec::new());
        }
        let stdout = self.git(&["rev-list", "--reverse", "HEAD"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Full message of `sha`, trimmed.
    pub async fn message(&self, sha: &str) -> Result<String> {
        let stdout = self.git(&["log", "-1", "--pretty=%B", sha]).await?;
        Ok(stdout.trim().to_string())
    }

    /// Zero-context diff introduced by `sha`, trimmed.
    pub async fn diff(&self, sha: &str) -> Result<String> {
        let stdout = self
            .git(&["show", sha, "--unified=0", "--pretty=format:"])
            .await?;
        Ok(stdout.trim().to_string())
    }

    /// Text for one commit according to `mode`.
    pub async fn commit_text(&self, sha: &str, mode: CommitTextMode) -> Result<CommitText> {
        let message = self.message(sha).await?;
        let text = match mode {
            CommitTextMode::Message => message,
            CommitTextMode::MessageAndDiff => {
                let diff = self.diff(sha).await?;
                format!("Commit message:\n{message}\n\nDiff:\n{diff}")
            }
        };

        Ok(CommitText {
            sha: sha.to_string(),
            text,
        })
    }

    /// Texts for the commits selected by `options`, oldest first.
    pub async fn collect(&self, options: CollectOptions) -> Result<Vec<CommitText>> {
        let mut ids = self.commit_ids().await?;
        if let Some(limit) = options.limit {
            let start = ids.len().saturating_sub(limit);
            ids.drain(..start);
        }

        let mut commits = Vec::with_capacity(ids.len());
        for sha in &ids {
            commits.push(self.commit_text(sha, options.mode).await?);
        }

        info!(
            "Extracted {} commits from {}",
            commits.len(),
            self.repo_dir.display()
        );
        Ok(commits)
    }
}
