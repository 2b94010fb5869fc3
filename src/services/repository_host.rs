use async_trait::async_trait;

use crate::domain::repository::{Affiliation, RepositoryEdge};
use crate::domain::stats::{Identity, LocStats};
use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub identity: Identity,
    pub created_at: String,
}

#[async_trait]
pub trait RepositoryHost: Send + Sync {
    async fn fetch_identity(&self, login: &str) -> AppResult<UserProfile>;

    /// Every repository the user is affiliated with, in the host's order.
    async fn fetch_repositories(
        &self,
        login: &str,
        affiliations: &[Affiliation],
    ) -> AppResult<Vec<RepositoryEdge>>;

    /// Walks the default-branch history. `Ok(None)` means there is no
    /// default branch or the repository could not be resolved.
    async fn fetch_commit_history(
        &self,
        owner: &str,
        name: &str,
        identity: &Identity,
    ) -> AppResult<Option<LocStats>>;
}
