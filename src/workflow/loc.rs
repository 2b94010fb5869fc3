use tracing::info;

use crate::cache::CacheStore;
use crate::context::AppContext;
use crate::domain::repository::Affiliation;
use crate::domain::stats::Totals;
use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct LocReport {
    pub totals: Totals,
    pub was_cached: bool,
    pub repository_count: usize,
    pub created_at: String,
}

pub async fn collect_totals(
    ctx: &AppContext,
    cache: &CacheStore,
    force_rebuild: bool,
) -> AppResult<LocReport> {
    let username = &ctx.config.username;
    let profile = ctx.host.fetch_identity(username).await?;
    info!(user = %username, created_at = %profile.created_at, "resolved identity");

    let repositories = ctx
        .host
        .fetch_repositories(username, &Affiliation::ALL)
        .await?;
    info!(count = repositories.len(), "listed repositories");

    let outcome = cache
        .reconcile_and_save(
            ctx.host.as_ref(),
            &repositories,
            &profile.identity,
            force_rebuild,
        )
        .await?;

    Ok(LocReport {
        totals: outcome.totals,
        was_cached: outcome.was_cached,
        repository_count: repositories.len(),
        created_at: profile.created_at,
    })
}
