//! Command implementations.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use tracing::{debug, info};

use commit_search_embeddings::{
    CacheBuilder, EmbeddingError, EmbeddingProvider, EmbeddingStore, FailurePolicy, JsonFileStore,
    OpenAIProvider, SearchResult, SimilaritySearch, SourceText, SqliteStore,
};
use commit_search_git::{CollectOptions, CommitSource, CommitTextMode};

use crate::cli::{Cli, Commands};
use crate::config::{AppConfig, CacheBackend, CacheConfig};

/// Resolve configuration and dispatch the subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    debug!("Resolved configuration: {config:?}");

    let mut stdout = std::io::stdout();
    match cli.command {
        Commands::Build {
            repo,
            limit,
            with_diff,
            skip_failures,
        } => {
            let request = BuildRequest {
                repo,
                limit: limit.or(config.build.limit),
                with_diff: with_diff || config.build.with_diff,
                policy: if skip_failures {
                    FailurePolicy::Skip
                } else {
                    config.build.failure_policy
                },
            };
            run_build(&config, request, &mut stdout).await
        }
        Commands::Search { query, top_k } => {
            let query = match query {
                Some(query) => query,
                None => read_query(&mut std::io::stdin().lock())?,
            };
            let top_k = top_k.unwrap_or(config.search.top_k);
            run_search(&config, &query, top_k, &mut stdout).await
        }
        Commands::Stats => run_stats(&config.cache, &mut stdout).await,
    }
}

/// Open the store described by `cache`.
pub async fn open_store(cache: &CacheConfig) -> Result<Arc<dyn EmbeddingStore>> {
    let path = cache.resolved_path();
    let store: Arc<dyn EmbeddingStore> = match cache.backend {
        CacheBackend::Json => Arc::new(
            JsonFileStore::open(&path)
                .await
                .with_context(|| format!("failed to open cache {}", path.display()))?,
        ),
        CacheBackend::Sqlite => Arc::new(
            SqliteStore::open(&path)
                .with_context(|| format!("failed to open cache {}", path.display()))?,
        ),
    };
    Ok(store)
}

/// Build the network provider, failing early when no API key is set.
pub fn open_provider(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = OpenAIProvider::new(config.embedding.clone());
    if !provider.is_available() {
        bail!("OPENAI_API_KEY is not set; export it or add it to a .env file");
    }
    Ok(Arc::new(provider))
}

/// Prompt on stderr and read one query line.
pub fn read_query(input: &mut impl BufRead) -> Result<String> {
    eprint!("Search query: ");
    std::io::stderr().flush().ok();

    let mut line = String::new();
    input.read_line(&mut line).context("failed to read query")?;

    let query = line.trim();
    if query.is_empty() {
        bail!("no search query given");
    }
    Ok(query.to_string())
}

/// Arguments for [`run_build`] after config and flags are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Repository to read.
    pub repo: PathBuf,

    /// Most recent N commits only.
    pub limit: Option<usize>,

    /// Include diffs in the embedded text.
    pub with_diff: bool,

    /// What to do with failing commits.
    pub policy: FailurePolicy,
}

/// Embed the repository's commits into the configured cache.
pub async fn run_build(config: &AppConfig, request: BuildRequest, out: &mut impl Write) -> Result<()> {
    let provider = open_provider(config)?;

    let source = CommitSource::new(&request.repo);
    let commits = source
        .collect(CollectOptions {
            limit: request.limit,
            mode: if request.with_diff {
                CommitTextMode::MessageAndDiff
            } else {
                CommitTextMode::Message
            },
        })
        .await
        .with_context(|| format!("failed to read commits from {}", request.repo.display()))?;

    if commits.is_empty() {
        writeln!(out, "No commits found in {}", request.repo.display())?;
        return Ok(());
    }

    let store = open_store(&config.cache).await?;
    build_cache(
        provider,
        store,
        commits.into_iter().map(|c| SourceText::new(c.sha, c.text)),
        request.policy,
        &config.cache.resolved_path(),
        out,
    )
    .await
}

/// Run the builder and print its summary.
pub async fn build_cache(
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    items: impl IntoIterator<Item = SourceText>,
    policy: FailurePolicy,
    cache_path: &Path,
    out: &mut impl Write,
) -> Result<()> {
    let report = CacheBuilder::new(provider, store)
        .with_policy(policy)
        .build(items)
        .await
        .context("cache build failed")?;

    writeln!(
        out,
        "Cache built and saved to {} ({} embedded, {} skipped)",
        cache_path.display(),
        report.embedded,
        report.skipped.len()
    )?;
    for skipped in &report.skipped {
        writeln!(out, "  skipped {}: {}", skipped.id, skipped.reason)?;
    }
    Ok(())
}

/// Search the configured cache and print the matches.
pub async fn run_search(config: &AppConfig, query: &str, top_k: usize, out: &mut impl Write) -> Result<()> {
    ensure!(top_k > 0, EmbeddingError::InvalidTopK);

    let store = open_store(&config.cache).await?;

    if store.stats().await?.records == 0 {
        info!("Cache {} is empty", config.cache.resolved_path().display());
        writeln!(
            out,
            "No cached embeddings found in {}",
            config.cache.resolved_path().display()
        )?;
        return Ok(());
    }

    let provider = open_provider(config)?;
    search_and_print(provider, store, query, top_k, out).await
}

/// Run one search and print the header plus one line per result.
pub async fn search_and_print(
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    query: &str,
    top_k: usize,
    out: &mut impl Write,
) -> Result<()> {
    let results = SimilaritySearch::new(provider, store)
        .search(query, top_k)
        .await
        .context("search failed")?;

    writeln!(out, "Top matching commits:")?;
    for result in &results {
        writeln!(out, "{}", format_result(result))?;
    }
    Ok(())
}

/// `<id> (similarity: <score>)` with four decimals.
pub fn format_result(result: &SearchResult) -> String {
    format!("{} (similarity: {:.4})", result.id, result.score)
}

/// Print record count and dimensionality of the configured cache.
pub async fn run_stats(cache: &CacheConfig, out: &mut impl Write) -> Result<()> {
    let store = open_store(cache).await?;
    let stats = store.stats().await?;

    writeln!(out, "Backend:   {}", store.name())?;
    writeln!(out, "Path:      {}", cache.resolved_path().display())?;
    writeln!(out, "Records:   {}", stats.records)?;
    match stats.dimension {
        Some(dimension) => writeln!(out, "Dimension: {dimension}")?,
        None => writeln!(out, "Dimension: -")?,
    }
    Ok(())
}
