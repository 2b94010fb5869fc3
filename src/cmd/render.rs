use std::path::PathBuf;

use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::context::AppContext;
use crate::error::AppResult;
use crate::infra::svg;
use crate::workflow::loc::{LocReport, collect_totals};

#[derive(Debug, Clone)]
pub struct RenderArgs {
    pub force_rebuild: bool,
}

pub struct RenderOutcome {
    pub report: LocReport,
    pub rendered: Vec<PathBuf>,
}

pub async fn run(ctx: &AppContext, args: RenderArgs) -> AppResult<RenderOutcome> {
    let cache = CacheStore::for_user(&ctx.config.cache_dir, &ctx.config.username);
    debug!(path = %cache.path().display(), "using cache file");
    let report = collect_totals(ctx, &cache, args.force_rebuild).await?;

    // Every output must render before any file is rewritten.
    let documents = ctx
        .config
        .outputs
        .iter()
        .map(|output| svg::prepare(output, &report.totals))
        .collect::<AppResult<Vec<_>>>()?;

    let mut rendered = Vec::with_capacity(documents.len());
    for document in documents {
        document.write()?;
        info!(path = %document.path.display(), "updated image");
        rendered.push(document.path);
    }

    Ok(RenderOutcome { report, rendered })
}
