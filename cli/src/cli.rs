//! CLI argument parsing for `commit-search`.
//!
//! Flags override the config file and the environment.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{AppConfig, CacheBackend};

/// Semantic search over git commit messages.
#[derive(Parser, Debug)]
#[command(name = "commit-search")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ./commit-search.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `commit_search_embeddings=trace`
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override cache file path
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Override cache backend
    #[arg(long, global = true, value_enum)]
    pub backend: Option<CacheBackend>,

    /// Override embedding model
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Fold the global flags into `config`.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(backend) = self.backend {
            config.cache.backend = backend;
        }
        if let Some(path) = &self.cache {
            config.cache.path = Some(path.clone());
        }
        if let Some(model) = &self.model {
            config.embedding.model = model.clone();
        }
    }
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Embed commit messages from a repository into the cache
    Build {
        /// Repository to read commits from
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Embed only the most recent N commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Append each commit's diff to its message
        #[arg(long)]
        with_diff: bool,

        /// Skip commits that fail instead of aborting the build
        #[arg(long)]
        skip_failures: bool,
    },

    /// Find the cached commits closest to a query
    Search {
        /// Query text; read from stdin when omitted
        #[arg(short, long)]
        query: Option<String>,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show what the cache holds
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "commit-search",
            "search",
            "-k",
            "5",
            "--backend",
            "sqlite",
            "--cache",
            "/tmp/cache.db",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Commands::Search {
                query: None,
                top_k: Some(5)
            }
        );

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.cache.resolved_path(), PathBuf::from("/tmp/cache.db"));
    }

    #[test]
    fn test_parse_build_defaults() {
        let cli = Cli::try_parse_from(["commit-search", "build"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Build {
                repo: PathBuf::from("."),
                limit: None,
                with_diff: false,
                skip_failures: false,
            }
        );
    }

    #[test]
    fn test_model_override() {
        let cli = Cli::try_parse_from(["commit-search", "--model", "m-large", "stats"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.embedding.model, "m-large");
    }
}
