//! Semantic search over git commit messages.
//!
//! # Usage
//!
//! ```bash
//! commit-search build [--repo DIR] [--limit N] [--with-diff] [--skip-failures]
//! commit-search search [--query TEXT] [--top-k N]
//! commit-search stats
//! ```
//!
//! Needs `OPENAI_API_KEY` in the environment or a `.env` file.

use std::process::ExitCode;

use clap::Parser;

use commit_search_cli::{Cli, init_tracing, run};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    init_tracing(cli.log_level.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
