mod cache;
mod cmd;
mod config;
mod context;
mod domain;
mod error;
mod infra;
mod logging;
mod services;
mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::cmd::render::{self, RenderArgs};
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::error::AppResult;
use crate::infra::github::GitHubClient;

#[derive(Parser)]
#[command(
    name = "locstat",
    author,
    version,
    about = "Count your lines of code across GitHub and write them into SVG cards"
)]
struct Cli {
    /// Discard the cache and walk every repository's history again.
    #[arg(long)]
    force_rebuild: bool,
    /// Directory holding the per-user cache file.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
    /// SVG file to update; repeat for several. Replaces the configured list.
    #[arg(long = "output", value_name = "FILE")]
    outputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    logging::init();

    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }
    if !cli.outputs.is_empty() {
        config.outputs = cli.outputs;
    }

    let host = Arc::new(GitHubClient::new(
        config.api_url.clone(),
        config.token.clone(),
    ));
    let context = AppContext::new(config, host);

    let outcome = render::run(
        &context,
        RenderArgs {
            force_rebuild: cli.force_rebuild,
        },
    )
    .await?;

    let report = &outcome.report;
    println!(
        "Lines of code: {} across {} repositories ({})",
        report.totals.summary_label(),
        report.repository_count,
        if report.was_cached {
            "cache hit"
        } else {
            "cache rebuilt"
        }
    );
    for path in &outcome.rendered {
        println!("Updated {}", path.display());
    }

    Ok(())
}
