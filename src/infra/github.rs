use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::domain::repository::{Affiliation, RepositoryEdge};
use crate::domain::stats::{CommitRecord, Identity, LocStats};
use crate::error::{AppError, AppResult};
use crate::services::{RepositoryHost, UserProfile};

pub const DEFAULT_ENDPOINT: &str = "https://api.github.com/graphql";

const REPOSITORY_PAGE_SIZE: u32 = 50;
const HISTORY_PAGE_SIZE: u32 = 100;

const IDENTITY_OPERATION: &str = "identity";
const REPOSITORIES_OPERATION: &str = "repository list";
const HISTORY_OPERATION: &str = "commit history";

const IDENTITY_QUERY: &str = r#"
query ($login: String!) {
    user(login: $login) {
        id
        createdAt
    }
}"#;

const REPOSITORIES_QUERY: &str = r#"
query ($owner_affiliation: [RepositoryAffiliation], $login: String!, $cursor: String, $first: Int!) {
    user(login: $login) {
        repositories(first: $first, after: $cursor, ownerAffiliations: $owner_affiliation) {
            edges {
                node {
                    ... on Repository {
                        nameWithOwner
                        defaultBranchRef {
                            target {
                                ... on Commit {
                                    history {
                                        totalCount
                                    }
                                }
                            }
                        }
                    }
                }
            }
            pageInfo {
                endCursor
                hasNextPage
            }
        }
    }
}"#;

const HISTORY_QUERY: &str = r#"
query ($repo_name: String!, $owner: String!, $cursor: String, $first: Int!) {
    repository(name: $repo_name, owner: $owner) {
        defaultBranchRef {
            target {
                ... on Commit {
                    history(first: $first, after: $cursor) {
                        totalCount
                        edges {
                            node {
                                ... on Commit {
                                    committedDate
                                }
                                author {
                                    user {
                                        id
                                    }
                                }
                                deletions
                                additions
                            }
                        }
                        pageInfo {
                            endCursor
                            hasNextPage
                        }
                    }
                }
            }
        }
    }
}"#;

pub struct GitHubClient {
    http: Client,
    endpoint: String,
    token: String,
}

impl GitHubClient {
    pub fn new(endpoint: String, token: String) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            token,
        }
    }

    async fn post<V, T>(&self, operation: &'static str, query: &str, variables: V) -> AppResult<T>
    where
        V: Serialize + Send,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("bearer {}", self.token))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, concat!("locstat/", env!("CARGO_PKG_VERSION")))
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|err| AppError::Http(format!("failed to call GitHub: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read response>".to_string());
        if status != StatusCode::OK {
            return Err(status_error(operation, status, body));
        }

        decode_data(operation, &body)
    }
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn fetch_identity(&self, login: &str) -> AppResult<UserProfile> {
        let data: IdentityData = self
            .post(IDENTITY_OPERATION, IDENTITY_QUERY, IdentityVariables { login })
            .await?;
        let user = data.user.ok_or_else(|| {
            AppError::Configuration(format!("GitHub user '{login}' does not exist"))
        })?;

        Ok(UserProfile {
            identity: Identity { id: user.id },
            created_at: user.created_at,
        })
    }

    async fn fetch_repositories(
        &self,
        login: &str,
        affiliations: &[Affiliation],
    ) -> AppResult<Vec<RepositoryEdge>> {
        let owner_affiliation: Vec<&str> = affiliations.iter().map(|a| a.as_str()).collect();
        let mut edges = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let data: RepositoriesData = self
                .post(
                    REPOSITORIES_OPERATION,
                    REPOSITORIES_QUERY,
                    RepositoriesVariables {
                        owner_affiliation: &owner_affiliation,
                        login,
                        cursor: cursor.as_deref(),
                        first: REPOSITORY_PAGE_SIZE,
                    },
                )
                .await?;
            let page = data
                .user
                .ok_or_else(|| {
                    AppError::Configuration(format!("GitHub user '{login}' does not exist"))
                })?
                .repositories;

            debug!(count = page.edges.len(), "fetched repository page");
            cursor = absorb_repository_page(&mut edges, page);
            if cursor.is_none() {
                return Ok(edges);
            }
        }
    }

    async fn fetch_commit_history(
        &self,
        owner: &str,
        name: &str,
        identity: &Identity,
    ) -> AppResult<Option<LocStats>> {
        let mut stats = LocStats::default();
        let mut cursor: Option<String> = None;

        loop {
            let data: HistoryData = self
                .post(
                    HISTORY_OPERATION,
                    HISTORY_QUERY,
                    HistoryVariables {
                        repo_name: name,
                        owner,
                        cursor: cursor.as_deref(),
                        first: HISTORY_PAGE_SIZE,
                    },
                )
                .await?;
            let Some(history) = data.into_history() else {
                return Ok(None);
            };

            cursor = absorb_history_page(&mut stats, history, identity);
            if cursor.is_none() {
                return Ok(Some(stats));
            }
        }
    }
}

fn status_error(operation: &'static str, status: StatusCode, body: String) -> AppError {
    if status == StatusCode::FORBIDDEN {
        return AppError::RateLimited;
    }
    if operation == IDENTITY_OPERATION {
        return AppError::Auth {
            status: status.as_u16(),
            body,
        };
    }
    AppError::Query {
        operation,
        status: status.as_u16(),
        body,
    }
}

fn decode_data<T: DeserializeOwned>(operation: &'static str, body: &str) -> AppResult<T> {
    let envelope: GraphQlResponse<T> =
        serde_json::from_str(body).map_err(|err| AppError::Decode {
            operation,
            message: err.to_string(),
        })?;

    match envelope.data {
        Some(data) => Ok(data),
        None if !envelope.errors.is_empty() => Err(AppError::Query {
            operation,
            status: StatusCode::OK.as_u16(),
            body: envelope
                .errors
                .into_iter()
                .map(|error| error.message)
                .collect::<Vec<_>>()
                .join("; "),
        }),
        None => Err(AppError::Decode {
            operation,
            message: "response carried neither data nor errors".to_string(),
        }),
    }
}

/// Appends the page's repositories and returns the cursor of the next page.
fn absorb_repository_page(edges: &mut Vec<RepositoryEdge>, page: RepositoryPage) -> Option<String> {
    edges.extend(page.edges.into_iter().map(|edge| {
        let commit_count = edge
            .node
            .default_branch_ref
            .and_then(|branch| branch.target.history)
            .map(|history| history.total_count);
        RepositoryEdge::new(edge.node.name_with_owner, commit_count)
    }));
    next_cursor(page.page_info)
}

/// Folds the page into `stats` and returns the cursor of the next page.
fn absorb_history_page(
    stats: &mut LocStats,
    history: HistoryPage,
    identity: &Identity,
) -> Option<String> {
    if history.edges.is_empty() {
        return None;
    }
    let mut oldest: Option<String> = None;
    for edge in history.edges {
        let record = edge.node.into_record();
        stats.record(&record, identity);
        oldest = record.committed_date.or(oldest);
    }
    debug!(
        through = oldest.as_deref().unwrap_or("unknown"),
        commits = stats.commits,
        "walked history page"
    );
    next_cursor(history.page_info)
}

fn next_cursor(page_info: PageInfo) -> Option<String> {
    if page_info.has_next_page {
        page_info.end_cursor
    } else {
        None
    }
}

#[derive(Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Serialize)]
struct IdentityVariables<'a> {
    login: &'a str,
}

#[derive(Serialize)]
struct RepositoriesVariables<'a> {
    owner_affiliation: &'a [&'a str],
    login: &'a str,
    cursor: Option<&'a str>,
    first: u32,
}

#[derive(Serialize)]
struct HistoryVariables<'a> {
    repo_name: &'a str,
    owner: &'a str,
    cursor: Option<&'a str>,
    first: u32,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Deserialize)]
struct IdentityData {
    user: Option<UserNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserNode {
    id: String,
    created_at: String,
}

#[derive(Deserialize)]
struct RepositoriesData {
    user: Option<RepositoriesUser>,
}

#[derive(Deserialize)]
struct RepositoriesUser {
    repositories: RepositoryPage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryPage {
    edges: Vec<RepositoryEdgeNode>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct RepositoryEdgeNode {
    node: RepositoryNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    name_with_owner: String,
    default_branch_ref: Option<BranchRef<CommitCount>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitCount {
    total_count: u64,
}

#[derive(Deserialize)]
struct BranchRef<H> {
    target: BranchTarget<H>,
}

#[derive(Deserialize)]
struct BranchTarget<H> {
    history: Option<H>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryData {
    repository: Option<HistoryRepository>,
}

impl HistoryData {
    fn into_history(self) -> Option<HistoryPage> {
        self.repository?.default_branch_ref?.target.history
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRepository {
    default_branch_ref: Option<BranchRef<HistoryPage>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPage {
    edges: Vec<CommitEdge>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct CommitEdge {
    node: CommitNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitNode {
    committed_date: Option<String>,
    author: Option<CommitAuthor>,
    additions: u64,
    deletions: u64,
}

impl CommitNode {
    fn into_record(self) -> CommitRecord {
        CommitRecord {
            committed_date: self.committed_date,
            author_id: self.author.and_then(|author| author.user).map(|user| user.id),
            additions: self.additions,
            deletions: self.deletions,
        }
    }
}

#[derive(Deserialize)]
struct CommitAuthor {
    user: Option<AuthorUser>,
}

#[derive(Deserialize)]
struct AuthorUser {
    id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

    use super::*;

    fn me() -> Identity {
        Identity {
            id: "U_me".to_string(),
        }
    }

    #[test]
    fn forbidden_is_rate_limited() {
        let err = status_error(HISTORY_OPERATION, StatusCode::FORBIDDEN, "slow down".into());
        assert!(matches!(err, AppError::RateLimited));
    }

    #[test]
    fn identity_failure_is_auth_error() {
        let err = status_error(
            IDENTITY_OPERATION,
            StatusCode::UNAUTHORIZED,
            "Bad credentials".into(),
        );
        match err {
            AppError::Auth { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Bad credentials");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn other_failures_carry_status_and_body() {
        let err = status_error(
            REPOSITORIES_OPERATION,
            StatusCode::BAD_GATEWAY,
            "upstream".into(),
        );
        assert_eq!(
            err.to_string(),
            "repository list query failed with 502: upstream"
        );
    }

    #[test]
    fn graphql_errors_without_data_surface_as_query_error() {
        let body = r#"{"data": null, "errors": [{"message": "a"}, {"message": "b"}]}"#;
        let err = decode_data::<IdentityData>(IDENTITY_OPERATION, body).err();
        match err {
            Some(AppError::Query { body, status, .. }) => {
                assert_eq!(status, 200);
                assert_eq!(body, "a; b");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_decode_error() {
        let body = r#"{"data": {"user": {"id": 5}}}"#;
        let err = decode_data::<IdentityData>(IDENTITY_OPERATION, body).err();
        assert!(matches!(err, Some(AppError::Decode { .. })));
    }

    #[test]
    fn decodes_identity() {
        let body = r#"{"data": {"user": {"id": "U_me", "createdAt": "2019-01-01T00:00:00Z"}}}"#;
        let data: IdentityData = decode_data(IDENTITY_OPERATION, body).unwrap();
        let user = data.user.unwrap();
        assert_eq!(user.id, "U_me");
        assert_eq!(user.created_at, "2019-01-01T00:00:00Z");
    }

    #[test]
    fn repository_page_keeps_order_and_missing_branches() {
        let body = r#"{"data": {"user": {"repositories": {
            "edges": [
                {"node": {"nameWithOwner": "me/a", "defaultBranchRef": {"target": {"history": {"totalCount": 12}}}}},
                {"node": {"nameWithOwner": "me/empty", "defaultBranchRef": null}},
                {"node": {"nameWithOwner": "org/b", "defaultBranchRef": {"target": {"history": {"totalCount": 3}}}}}
            ],
            "pageInfo": {"endCursor": "Y3Vyc29y", "hasNextPage": true}
        }}}}"#;
        let data: RepositoriesData = decode_data(REPOSITORIES_OPERATION, body).unwrap();
        let mut edges = Vec::new();
        let cursor = absorb_repository_page(&mut edges, data.user.unwrap().repositories);

        assert_eq!(cursor.as_deref(), Some("Y3Vyc29y"));
        assert_eq!(
            edges,
            vec![
                RepositoryEdge::new("me/a", Some(12)),
                RepositoryEdge::new("me/empty", None),
                RepositoryEdge::new("org/b", Some(3)),
            ]
        );
    }

    #[test]
    fn history_page_filters_by_author_and_stops_on_last_page() {
        let body = r#"{"data": {"repository": {"defaultBranchRef": {"target": {"history": {
            "totalCount": 3,
            "edges": [
                {"node": {"committedDate": "2024-01-01T00:00:00Z", "author": {"user": {"id": "U_me"}}, "additions": 40, "deletions": 10}},
                {"node": {"committedDate": "2024-01-02T00:00:00Z", "author": {"user": null}, "additions": 5, "deletions": 5}},
                {"node": {"committedDate": "2024-01-03T00:00:00Z", "author": {"user": {"id": "U_other"}}, "additions": 1, "deletions": 1}}
            ],
            "pageInfo": {"endCursor": "abc", "hasNextPage": false}
        }}}}}}"#;
        let data: HistoryData = decode_data(HISTORY_OPERATION, body).unwrap();
        let mut stats = LocStats::default();
        let cursor = absorb_history_page(&mut stats, data.into_history().unwrap(), &me());

        assert_eq!(cursor, None);
        assert_eq!(
            stats,
            LocStats {
                additions: 40,
                deletions: 10,
                commits: 1
            }
        );
    }

    #[test]
    fn empty_history_page_ends_pagination() {
        let body = r#"{"data": {"repository": {"defaultBranchRef": {"target": {"history": {
            "totalCount": 0,
            "edges": [],
            "pageInfo": {"endCursor": "abc", "hasNextPage": true}
        }}}}}}"#;
        let data: HistoryData = decode_data(HISTORY_OPERATION, body).unwrap();
        let mut stats = LocStats::default();
        assert_eq!(
            absorb_history_page(&mut stats, data.into_history().unwrap(), &me()),
            None
        );
    }

    #[test]
    fn missing_default_branch_has_no_history() {
        let body = r#"{"data": {"repository": {"defaultBranchRef": null}}}"#;
        let data: HistoryData = decode_data(HISTORY_OPERATION, body).unwrap();
        assert!(data.into_history().is_none());

        let body = r#"{"data": {"repository": null}, "errors": [{"message": "not found"}]}"#;
        let data: HistoryData = decode_data(HISTORY_OPERATION, body).unwrap();
        assert!(data.into_history().is_none());
    }

    const TOKEN: &str = "ghp_test";

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(format!("{}/graphql", server.uri()), TOKEN.to_string())
    }

    fn graphql(variables: Value) -> MockBuilder {
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "bearer ghp_test"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({ "variables": variables })))
    }

    fn repository_page(repos: &[(&str, Option<u64>)], end_cursor: &str, has_next: bool) -> Value {
        let edges: Vec<Value> = repos
            .iter()
            .map(|(name, count)| {
                json!({"node": {
                    "nameWithOwner": name,
                    "defaultBranchRef": count.map(|total| json!({"target": {"history": {"totalCount": total}}})),
                }})
            })
            .collect();
        json!({"data": {"user": {"repositories": {
            "edges": edges,
            "pageInfo": {"endCursor": end_cursor, "hasNextPage": has_next}
        }}}})
    }

    fn history_page(commits: &[(Option<&str>, u64, u64)], end_cursor: &str, has_next: bool) -> Value {
        let edges: Vec<Value> = commits
            .iter()
            .map(|(author, additions, deletions)| {
                json!({"node": {
                    "committedDate": "2024-05-01T12:00:00Z",
                    "author": {"user": author.map(|id| json!({"id": id}))},
                    "additions": additions,
                    "deletions": deletions,
                }})
            })
            .collect();
        json!({"data": {"repository": {"defaultBranchRef": {"target": {"history": {
            "totalCount": 99,
            "edges": edges,
            "pageInfo": {"endCursor": end_cursor, "hasNextPage": has_next}
        }}}}}})
    }

    #[tokio::test]
    async fn follows_repository_cursor_and_keeps_order() {
        let server = MockServer::start().await;
        graphql(json!({
            "login": "octocat",
            "cursor": null,
            "first": 50,
            "owner_affiliation": ["OWNER", "COLLABORATOR", "ORGANIZATION_MEMBER"]
        }))
        .respond_with(ResponseTemplate::new(200).set_body_json(repository_page(
            &[("octocat/b", Some(4)), ("org/empty", None)],
            "cursor-1",
            true,
        )))
        .expect(1)
        .mount(&server)
        .await;
        graphql(json!({"login": "octocat", "cursor": "cursor-1", "first": 50}))
            .respond_with(ResponseTemplate::new(200).set_body_json(repository_page(
                &[("octocat/a", Some(9))],
                "cursor-2",
                false,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let edges = client(&server)
            .fetch_repositories("octocat", &Affiliation::ALL)
            .await
            .unwrap();

        assert_eq!(
            edges,
            vec![
                RepositoryEdge::new("octocat/b", Some(4)),
                RepositoryEdge::new("org/empty", None),
                RepositoryEdge::new("octocat/a", Some(9)),
            ]
        );
    }

    #[tokio::test]
    async fn walks_history_pages_counting_only_own_commits() {
        let server = MockServer::start().await;
        graphql(json!({"owner": "octocat", "repo_name": "hello", "cursor": null, "first": 100}))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_page(
                &[(Some("U_me"), 40, 10), (Some("U_other"), 5, 5)],
                "h-1",
                true,
            )))
            .expect(1)
            .mount(&server)
            .await;
        graphql(json!({"owner": "octocat", "repo_name": "hello", "cursor": "h-1", "first": 100}))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_page(
                &[(Some("U_me"), 2, 1), (None, 300, 300)],
                "h-2",
                false,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let stats = client(&server)
            .fetch_commit_history("octocat", "hello", &me())
            .await
            .unwrap();

        assert_eq!(
            stats,
            Some(LocStats {
                additions: 42,
                deletions: 11,
                commits: 2
            })
        );
    }

    #[tokio::test]
    async fn history_without_default_branch_is_none() {
        let server = MockServer::start().await;
        graphql(json!({"owner": "octocat", "repo_name": "empty"}))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"repository": {"defaultBranchRef": null}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stats = client(&server)
            .fetch_commit_history("octocat", "empty", &me())
            .await
            .unwrap();
        assert_eq!(stats, None);
    }

    #[tokio::test]
    async fn forbidden_history_response_is_rate_limited() {
        let server = MockServer::start().await;
        graphql(json!({"owner": "octocat", "repo_name": "hello"}))
            .respond_with(ResponseTemplate::new(403).set_body_string("abuse detected"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_commit_history("octocat", "hello", &me())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited));
    }

    #[tokio::test]
    async fn bad_gateway_on_repository_list_is_fatal() {
        let server = MockServer::start().await;
        graphql(json!({"login": "octocat"}))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_repositories("octocat", &Affiliation::ALL)
            .await
            .unwrap_err();
        match err {
            AppError::Query {
                operation,
                status,
                body,
            } => {
                assert_eq!(operation, REPOSITORIES_OPERATION);
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_identity_lookup_is_auth_error() {
        let server = MockServer::start().await;
        graphql(json!({"login": "octocat"}))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).fetch_identity("octocat").await.unwrap_err();
        assert!(matches!(err, AppError::Auth { status: 401, .. }));
    }

    #[tokio::test]
    async fn resolves_identity_over_the_wire() {
        let server = MockServer::start().await;
        graphql(json!({"login": "octocat"}))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"user": {"id": "U_me", "createdAt": "2019-01-01T00:00:00Z"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = client(&server).fetch_identity("octocat").await.unwrap();
        assert_eq!(profile.identity, me());
        assert_eq!(profile.created_at, "2019-01-01T00:00:00Z");
    }
}
