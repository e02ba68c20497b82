use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use hubcast_core::current_unix_timestamp_ms;
use hubcast_events::canonical_event::RepoRef;
use hubcast_events::normalize::FeedEvent;
use hubcast_events::transport::{is_transient_status, truncate_for_error};

#[derive(Debug, Error)]
/// Failure of one GitHub API call. Calls are single-attempt; classification
/// only controls log severity at the poll loop.
pub enum GithubApiError {
    #[error("github api {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("github api {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode github {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("github graphql {operation} failed: {detail}")]
    Graphql {
        operation: &'static str,
        detail: String,
    },
    #[error("github api {operation} returned an unexpected response: {detail}")]
    Malformed {
        operation: &'static str,
        detail: String,
    },
}

impl GithubApiError {
    /// Transient conditions (server 5xx, timeout, unreachable host,
    /// connection reset) self-heal on the next cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Decode { .. } | Self::Graphql { .. } | Self::Malformed { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, GithubApiError>;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatedUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryMetadata {
    pub owner: RepositoryOwner,
    #[serde(default)]
    pub permissions: Option<RepositoryPermissions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRepository {
    pub name: String,
    pub owner: RepositoryOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSubject {
    #[serde(rename = "type")]
    pub subject_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// One thread of the cross-repository notification feed.
pub struct NotificationThread {
    pub id: String,
    pub repository: NotificationRepository,
    pub subject: NotificationSubject,
    #[serde(default)]
    pub last_read_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// Issue or pull request detail fetched while resolving a notification.
pub struct ThreadRecord {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: String,
    pub user: CommentAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentCreateResponse {
    pub id: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Clone)]
/// Authenticated GitHub REST + GraphQL client. Each operation performs a
/// single attempt; retry policy lives with the poll cadence, not here.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    graphql_url: String,
}

impl GithubApiClient {
    pub fn new(
        api_base: String,
        graphql_url: String,
        token: String,
        request_timeout_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("hubcast-activity-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
            graphql_url,
        })
    }

    pub async fn authenticated_user(&self) -> ApiResult<AuthenticatedUser> {
        self.request_json(
            "resolve authenticated user",
            self.http.get(format!("{}/user", self.api_base)),
        )
        .await
    }

    pub async fn get_repository(&self, repo: &RepoRef) -> ApiResult<RepositoryMetadata> {
        self.request_json(
            "get repository",
            self.http
                .get(format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.name)),
        )
        .await
    }

    /// Subscribes the authenticated identity to all activity on the
    /// repository. Best-effort at the call site.
    pub async fn set_repository_subscription(&self, repo: &RepoRef) -> ApiResult<()> {
        self.request_unit(
            "set repository subscription",
            self.http
                .put(format!(
                    "{}/repos/{}/{}/subscription",
                    self.api_base, repo.owner, repo.name
                ))
                .json(&json!({ "subscribed": true, "ignored": false })),
        )
        .await
    }

    /// Fetches the most recent activity records for one repository,
    /// newest-first.
    pub async fn list_repo_events(
        &self,
        repo: &RepoRef,
        per_page: u32,
    ) -> ApiResult<Vec<FeedEvent>> {
        self.request_json(
            "list repository events",
            self.http
                .get(format!(
                    "{}/repos/{}/{}/events",
                    self.api_base, repo.owner, repo.name
                ))
                .query(&[("per_page", per_page.to_string().as_str())]),
        )
        .await
    }

    /// Fetches unread notifications for the authenticated identity.
    pub async fn list_notifications(&self, per_page: u32) -> ApiResult<Vec<NotificationThread>> {
        self.request_json(
            "list notifications",
            self.http
                .get(format!("{}/notifications", self.api_base))
                .query(&[
                    ("all", "false"),
                    ("per_page", per_page.to_string().as_str()),
                ]),
        )
        .await
    }

    pub async fn mark_thread_read(&self, thread_id: &str) -> ApiResult<()> {
        self.request_unit(
            "mark notification thread read",
            self.http.patch(format!(
                "{}/notifications/threads/{}",
                self.api_base, thread_id
            )),
        )
        .await
    }

    pub async fn get_issue(&self, repo: &RepoRef, number: u64) -> ApiResult<ThreadRecord> {
        self.request_json(
            "get issue",
            self.http.get(format!(
                "{}/repos/{}/{}/issues/{}",
                self.api_base, repo.owner, repo.name, number
            )),
        )
        .await
    }

    pub async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> ApiResult<ThreadRecord> {
        self.request_json(
            "get pull request",
            self.http.get(format!(
                "{}/repos/{}/{}/pulls/{}",
                self.api_base, repo.owner, repo.name, number
            )),
        )
        .await
    }

    /// Lists comments on the shared issue/pull timeline, oldest-first,
    /// optionally restricted to comments updated at or after `since`.
    pub async fn list_issue_comments_since(
        &self,
        repo: &RepoRef,
        number: u64,
        since: Option<&str>,
    ) -> ApiResult<Vec<CommentRecord>> {
        let mut request = self
            .http
            .get(format!(
                "{}/repos/{}/{}/issues/{}/comments",
                self.api_base, repo.owner, repo.name, number
            ))
            .query(&[("per_page", "100")]);
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }
        self.request_json("list issue comments", request).await
    }

    pub async fn create_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> ApiResult<CommentCreateResponse> {
        self.request_json(
            "create issue comment",
            self.http
                .post(format!(
                    "{}/repos/{}/{}/issues/{}/comments",
                    self.api_base, repo.owner, repo.name, number
                ))
                .json(&json!({ "body": body })),
        )
        .await
    }

    /// Resolves the GraphQL node id of a discussion by number.
    pub async fn discussion_node_id(&self, repo: &RepoRef, number: u64) -> ApiResult<String> {
        let query = "query($owner: String!, $repo: String!, $number: Int!) {\
 repository(owner: $owner, name: $repo) { discussion(number: $number) { id } } }";
        let data = self
            .graphql(
                "resolve discussion id",
                query,
                json!({ "owner": repo.owner, "repo": repo.name, "number": number }),
            )
            .await?;
        data.pointer("/repository/discussion/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(GithubApiError::Graphql {
                operation: "resolve discussion id",
                detail: format!("discussion #{number} not found"),
            })
    }

    /// Posts a discussion comment via the `addDiscussionComment` mutation and
    /// returns the created comment's node id.
    pub async fn add_discussion_comment(
        &self,
        discussion_id: &str,
        body: &str,
    ) -> ApiResult<String> {
        let mutation = "mutation($discussionId: ID!, $body: String!) {\
 addDiscussionComment(input: {discussionId: $discussionId, body: $body}) { comment { id } } }";
        let data = self
            .graphql(
                "add discussion comment",
                mutation,
                json!({ "discussionId": discussion_id, "body": body }),
            )
            .await?;
        data.pointer("/addDiscussionComment/comment/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(GithubApiError::Graphql {
                operation: "add discussion comment",
                detail: "mutation returned no comment id".to_string(),
            })
    }

    /// Uploads an asset so it can be referenced from issue/pull comments.
    /// The multipart body is assembled by hand; returns the hosted URL.
    pub async fn upload_repo_asset(
        &self,
        repo: &RepoRef,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<String> {
        let boundary = format!("----HubcastFormBoundary{}", current_unix_timestamp_ms());
        let mut body: Vec<u8> = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let uploaded: Value = self
            .request_json(
                "upload repository asset",
                self.http
                    .post(format!(
                        "{}/repos/{}/{}/assets",
                        self.api_base, repo.owner, repo.name
                    ))
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(body),
            )
            .await?;
        uploaded
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(GithubApiError::Malformed {
                operation: "upload repository asset",
                detail: "upload response carried no url".to_string(),
            })
    }

    async fn graphql(
        &self,
        operation: &'static str,
        query: &str,
        variables: Value,
    ) -> ApiResult<Value> {
        let envelope: Value = self
            .request_json(
                operation,
                self.http
                    .post(&self.graphql_url)
                    .json(&json!({ "query": query, "variables": variables })),
            )
            .await?;
        if let Some(errors) = envelope.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let detail = errors[0]
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown graphql error")
                    .to_string();
                return Err(GithubApiError::Graphql { operation, detail });
            }
        }
        Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        let response = request
            .send()
            .await
            .map_err(|source| GithubApiError::Transport { operation, source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubApiError::Status {
                operation,
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| GithubApiError::Decode { operation, source })
    }

    async fn request_unit(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<()> {
        let response = request
            .send()
            .await
            .map_err(|source| GithubApiError::Transport { operation, source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubApiError::Status {
                operation,
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }
        Ok(())
    }
}
