use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::repository::{Affiliation, RepositoryEdge};
use crate::domain::stats::{Identity, LocStats};
use crate::error::{AppError, AppResult};
use crate::services::{RepositoryHost, UserProfile};

pub enum FakeHistory {
    Stats(LocStats),
    NoBranch,
    RateLimited,
}

/// In-memory host that records every history walk it is asked for.
pub struct FakeHost {
    pub repositories: Vec<RepositoryEdge>,
    histories: HashMap<String, FakeHistory>,
    history_calls: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn new(repositories: Vec<RepositoryEdge>) -> Self {
        Self {
            repositories,
            histories: HashMap::new(),
            history_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_history(mut self, name_with_owner: &str, history: FakeHistory) -> Self {
        self.histories.insert(name_with_owner.to_string(), history);
        self
    }

    pub fn history_calls(&self) -> Vec<String> {
        self.history_calls.lock().unwrap().clone()
    }

    pub fn identity() -> Identity {
        Identity {
            id: "U_me".to_string(),
        }
    }
}

pub fn stats(additions: u64, deletions: u64, commits: u64) -> FakeHistory {
    FakeHistory::Stats(LocStats {
        additions,
        deletions,
        commits,
    })
}

#[async_trait]
impl RepositoryHost for FakeHost {
    async fn fetch_identity(&self, _login: &str) -> AppResult<UserProfile> {
        Ok(UserProfile {
            identity: Self::identity(),
            created_at: "2019-04-01T00:00:00Z".to_string(),
        })
    }

    async fn fetch_repositories(
        &self,
        _login: &str,
        _affiliations: &[Affiliation],
    ) -> AppResult<Vec<RepositoryEdge>> {
        Ok(self.repositories.clone())
    }

    async fn fetch_commit_history(
        &self,
        owner: &str,
        name: &str,
        _identity: &Identity,
    ) -> AppResult<Option<LocStats>> {
        let key = format!("{owner}/{name}");
        self.history_calls.lock().unwrap().push(key.clone());
        match self.histories.get(&key) {
            Some(FakeHistory::Stats(stats)) => Ok(Some(*stats)),
            Some(FakeHistory::RateLimited) => Err(AppError::RateLimited),
            Some(FakeHistory::NoBranch) | None => Ok(None),
        }
    }
}
