use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use tracing::{info, warn};

use crate::domain::repository::RepositoryEdge;
use crate::domain::stats::{Identity, Totals};
use crate::error::{AppError, AppResult};
use crate::services::RepositoryHost;

const CACHE_EXTENSION: &str = "txt";

/// One repository's cached contribution counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLine {
    pub repo_hash: String,
    pub known_commits: u64,
    pub my_commits: u64,
    pub additions: u64,
    pub deletions: u64,
}

impl CacheLine {
    pub fn placeholder(repo_hash: String) -> Self {
        Self {
            repo_hash,
            known_commits: 0,
            my_commits: 0,
            additions: 0,
            deletions: 0,
        }
    }

    pub fn parse(line: &str) -> AppResult<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let &[repo_hash, known, mine, additions, deletions] = fields.as_slice() else {
            return Err(AppError::CacheCorruption(format!(
                "expected 5 fields, found {} in '{line}'",
                fields.len()
            )));
        };
        let number = |value: &str| {
            value.parse::<u64>().map_err(|err| {
                AppError::CacheCorruption(format!("invalid count '{value}' in '{line}': {err}"))
            })
        };

        Ok(Self {
            repo_hash: repo_hash.to_string(),
            known_commits: number(known)?,
            my_commits: number(mine)?,
            additions: number(additions)?,
            deletions: number(deletions)?,
        })
    }
}

impl fmt::Display for CacheLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.repo_hash, self.known_commits, self.my_commits, self.additions, self.deletions
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOutcome {
    pub totals: Totals,
    /// False when the cache had to be rebuilt or an entry was missing.
    pub was_cached: bool,
}

pub struct CacheStore {
    file_path: PathBuf,
}

impl CacheStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn for_user(cache_dir: &Path, username: &str) -> Self {
        let file_name = format!("{}.{CACHE_EXTENSION}", compute_hash(username));
        Self::new(cache_dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Reads the raw cache lines, creating an empty cache on first use.
    pub fn load(&self) -> AppResult<Vec<String>> {
        match fs::read_to_string(&self.file_path) {
            Ok(contents) => Ok(contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.save(&[])?;
                Ok(Vec::new())
            }
            Err(err) => Err(AppError::Io(err)),
        }
    }

    /// Resets the cache to one zeroed line per repository, in list order.
    pub fn rebuild(&self, repositories: &[RepositoryEdge]) -> AppResult<Vec<CacheLine>> {
        let lines: Vec<CacheLine> = repositories
            .iter()
            .map(|repository| CacheLine::placeholder(compute_hash(&repository.name_with_owner)))
            .collect();
        self.save(&lines)?;
        Ok(lines)
    }

    pub async fn reconcile_and_save(
        &self,
        host: &dyn RepositoryHost,
        repositories: &[RepositoryEdge],
        identity: &Identity,
        force_rebuild: bool,
    ) -> AppResult<CacheOutcome> {
        let raw = self.load()?;
        let mut was_cached = true;

        let entries = if force_rebuild || raw.len() != repositories.len() {
            info!(
                cached = raw.len(),
                repositories = repositories.len(),
                forced = force_rebuild,
                "rebuilding cache"
            );
            was_cached = false;
            self.rebuild(repositories)?
        } else {
            match raw
                .iter()
                .map(|line| CacheLine::parse(line))
                .collect::<AppResult<Vec<_>>>()
            {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(%err, "cache is unreadable, rebuilding");
                    was_cached = false;
                    self.rebuild(repositories)?
                }
            }
        };

        // Repeated names keep one entry each, consumed in file order.
        let mut by_hash: HashMap<String, VecDeque<CacheLine>> = HashMap::new();
        for line in entries {
            by_hash
                .entry(line.repo_hash.clone())
                .or_default()
                .push_back(line);
        }

        let mut lines = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let repo_hash = compute_hash(&repository.name_with_owner);
            let cached = match by_hash
                .get_mut(&repo_hash)
                .and_then(VecDeque::pop_front)
            {
                Some(line) => line,
                None => {
                    warn!(
                        repository = %repository.name_with_owner,
                        "repository has no matching cache entry, resetting it"
                    );
                    was_cached = false;
                    CacheLine::placeholder(repo_hash)
                }
            };
            lines.push(refresh_line(host, repository, cached, identity).await?);
        }

        self.save(&lines)?;

        Ok(CacheOutcome {
            totals: sum_lines(&lines),
            was_cached,
        })
    }

    fn save(&self, lines: &[CacheLine]) -> AppResult<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data: String = lines.iter().map(|line| format!("{line}\n")).collect();
        fs::write(&self.file_path, data)?;
        Ok(())
    }
}

async fn refresh_line(
    host: &dyn RepositoryHost,
    repository: &RepositoryEdge,
    cached: CacheLine,
    identity: &Identity,
) -> AppResult<CacheLine> {
    let Some(live_commits) = repository.commit_count else {
        return Ok(CacheLine::placeholder(cached.repo_hash));
    };
    if live_commits == cached.known_commits {
        return Ok(cached);
    }
    let Some((owner, name)) = repository.owner_and_name() else {
        warn!(repository = %repository.name_with_owner, "unexpected repository name");
        return Ok(CacheLine::placeholder(cached.repo_hash));
    };

    info!(
        repository = %repository.name_with_owner,
        cached = cached.known_commits,
        live = live_commits,
        "commit count changed, walking history"
    );
    let line = match host.fetch_commit_history(owner, name, identity).await? {
        Some(stats) => CacheLine {
            repo_hash: cached.repo_hash,
            known_commits: live_commits,
            my_commits: stats.commits,
            additions: stats.additions,
            deletions: stats.deletions,
        },
        None => CacheLine::placeholder(cached.repo_hash),
    };
    Ok(line)
}

pub fn sum_lines(lines: &[CacheLine]) -> Totals {
    lines.iter().fold(Totals::default(), |totals, line| Totals {
        additions: totals.additions.saturating_add(line.additions),
        deletions: totals.deletions.saturating_add(line.deletions),
    })
}

pub fn compute_hash(value: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_hex().to_string()
}
