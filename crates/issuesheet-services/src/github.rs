// crates/issuesheet-services/src/github.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use issuesheet_core::{GitHubConfig, ReqwestErrorExt, TrackerError};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use url::Url;

/// Upper bound on followed `Link: rel="next"` pages per listing.
const MAX_PAGES: usize = 50;

/// GitHub issue representation.
///
/// The same shape arrives embedded in webhook deliveries, so everything
/// beyond number/title/url is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
    /// Present only on pull requests, which the issues endpoint also returns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

fn default_state() -> String {
    "open".to_string()
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    /// Label names in the order the tracker returned them.
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Assignee logins in the order the tracker returned them.
    pub fn assignee_logins(&self) -> Vec<String> {
        self.assignees.iter().map(|a| a.login.clone()).collect()
    }

    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// GitHub label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// GitHub user, reduced to what the sheet shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

/// Issue comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Most recently created comment; among equal timestamps the later one in
/// tracker order wins.
pub fn latest_comment(comments: &[Comment]) -> Option<&Comment> {
    comments
        .iter()
        .enumerate()
        .max_by_key(|(position, c)| (c.created_at, *position))
        .map(|(_, c)| c)
}

/// Request to replace an issue's label set
#[derive(Debug, Serialize)]
pub struct SetLabelsRequest<'a> {
    pub labels: &'a [String],
}

/// Request to create a comment
#[derive(Debug, Serialize)]
pub struct CreateCommentRequest<'a> {
    pub body: &'a str,
}

/// Read/write calls the sync engine makes against the remote tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Open issues, pull requests excluded.
    async fn list_open_issues(&self) -> Result<Vec<Issue>, TrackerError>;

    async fn get_issue(&self, number: u64) -> Result<Issue, TrackerError>;

    /// Comments in creation order.
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, TrackerError>;

    /// Replace the full label set; returns the labels the tracker now holds.
    async fn set_labels(&self, number: u64, labels: &[String]) -> Result<Vec<String>, TrackerError>;

    async fn post_comment(&self, number: u64, body: &str) -> Result<Comment, TrackerError>;

    /// Repository-wide label vocabulary.
    async fn list_all_label_names(&self) -> Result<Vec<String>, TrackerError>;
}

/// GitHub REST client scoped to one repository
#[derive(Debug, Clone)]
pub struct GitHubClient {
    repo_url: Url,
    client: Arc<Client>,
    token: String,
}

impl GitHubClient {
    /// Create a client for the repository named in `config`
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        Self::with_repo_url(&config.repo_url(), config.access_token.clone())
    }

    /// Create a client against an explicit `.../repos/{owner}/{repo}` root
    pub fn with_repo_url(repo_url: &str, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Trailing slash so relative joins land under the repository
        let repo_url = Url::parse(&format!("{}/", repo_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid repository URL: {}", repo_url))?;

        Ok(Self {
            repo_url,
            client: Arc::new(client),
            token,
        })
    }

    /// Build request with auth headers
    fn build_request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, "issuesheet")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn url(&self, path: &str) -> Result<Url, TrackerError> {
        self.repo_url
            .join(path)
            .map_err(|e| TrackerError::InvalidResponse(format!("bad request path {}: {}", path, e)))
    }

    /// Send and map transport failures and non-2xx statuses
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, TrackerError> {
        let response = self
            .build_request(req)
            .send()
            .await
            .map_err(ReqwestErrorExt::into_tracker_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!("GitHub API error ({}): {}", status, message);
            return Err(TrackerError::RemoteRejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TrackerError> {
        let bytes = response
            .bytes()
            .await
            .map_err(ReqwestErrorExt::into_tracker_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TrackerError::InvalidResponse(format!("JSON parse error: {}", e)))
    }

    /// GET a listing and follow `rel="next"` links
    async fn get_paged<T: DeserializeOwned>(
        &self,
        first: Url,
    ) -> Result<Vec<T>, TrackerError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            let response = self.send(self.client.get(url)).await?;
            next = next_page_url(response.headers());
            let page: Vec<T> = Self::decode(response).await?;
            items.extend(page);

            // A partial listing would look complete to the caller
            if pages >= MAX_PAGES && next.is_some() {
                tracing::error!("Listing still paginating after {} pages", MAX_PAGES);
                return Err(TrackerError::InvalidResponse(format!(
                    "listing exceeds {} pages",
                    MAX_PAGES
                )));
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    #[instrument(skip(self), level = "debug")]
    async fn list_open_issues(&self) -> Result<Vec<Issue>, TrackerError> {
        let mut url = self.url("issues")?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("per_page", "100");

        let issues: Vec<Issue> = self.get_paged(url).await?;
        let total = issues.len();
        let issues: Vec<Issue> = issues.into_iter().filter(|i| !i.is_pull_request()).collect();

        tracing::info!(
            "Fetched {} open issues ({} pull requests skipped)",
            issues.len(),
            total - issues.len()
        );
        Ok(issues)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_issue(&self, number: u64) -> Result<Issue, TrackerError> {
        let url = self.url(&format!("issues/{}", number))?;
        let response = self.send(self.client.get(url)).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, TrackerError> {
        let mut url = self.url(&format!("issues/{}/comments", number))?;
        url.query_pairs_mut().append_pair("per_page", "100");
        self.get_paged(url).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_labels(&self, number: u64, labels: &[String]) -> Result<Vec<String>, TrackerError> {
        let url = self.url(&format!("issues/{}", number))?;
        let request = self.client.patch(url).json(&SetLabelsRequest { labels });

        let response = self.send(request).await?;
        let issue: Issue = Self::decode(response).await?;

        tracing::info!("Set {} labels on issue #{}", labels.len(), number);
        Ok(issue.label_names())
    }

    #[instrument(skip(self, body), level = "debug")]
    async fn post_comment(&self, number: u64, body: &str) -> Result<Comment, TrackerError> {
        let url = self.url(&format!("issues/{}/comments", number))?;
        let request = self.client.post(url).json(&CreateCommentRequest { body });

        let response = self.send(request).await?;
        let comment: Comment = Self::decode(response).await?;

        tracing::info!("Posted comment {} on issue #{}", comment.id, number);
        Ok(comment)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_all_label_names(&self) -> Result<Vec<String>, TrackerError> {
        let mut url = self.url("labels")?;
        url.query_pairs_mut().append_pair("per_page", "100");
        let labels: Vec<Label> = self.get_paged(url).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_page_url(headers: &header::HeaderMap) -> Option<Url> {
    let link = headers.get(header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn comment(id: u64, created_at: &str) -> Comment {
        Comment {
            id,
            body: Some(format!("comment {}", id)),
            created_at: created_at.parse().unwrap(),
        }
    }

    #[test]
    fn test_issue_deserialization() {
        let json = r#"{
            "id": 456,
            "number": 42,
            "title": "Test issue",
            "body": "Issue body",
            "state": "open",
            "html_url": "https://github.com/user/repo/issues/42",
            "labels": [{"id": 1, "name": "bug", "color": "ff0000"}],
            "assignees": [{"login": "alice", "id": 7}],
            "created_at": "2026-01-21T00:00:00Z"
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.number, 42);
        assert_eq!(issue.label_names(), vec!["bug"]);
        assert_eq!(issue.assignee_logins(), vec!["alice"]);
        assert!(!issue.is_pull_request());
    }

    #[test]
    fn test_webhook_issue_minimal_shape() {
        let json = r#"{
            "number": 3,
            "title": "From a webhook",
            "html_url": "https://github.com/user/repo/issues/3",
            "body": null
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.state, "open");
        assert_eq!(issue.body_text(), "");
        assert!(issue.labels.is_empty());
    }

    #[test]
    fn test_pull_request_marker() {
        let json = r#"{
            "number": 9,
            "title": "A PR",
            "html_url": "https://github.com/user/repo/pull/9",
            "pull_request": {"url": "https://api.github.com/repos/user/repo/pulls/9"}
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.is_pull_request());
    }

    #[test]
    fn test_latest_comment_by_timestamp() {
        let comments = vec![
            comment(1, "2026-01-01T00:00:00Z"),
            comment(3, "2026-03-01T00:00:00Z"),
            comment(2, "2026-02-01T00:00:00Z"),
        ];
        assert_eq!(latest_comment(&comments).unwrap().id, 3);
    }

    #[test]
    fn test_latest_comment_tie_prefers_later_position() {
        let comments = vec![
            comment(10, "2026-01-01T00:00:00Z"),
            comment(11, "2026-01-01T00:00:00Z"),
        ];
        assert_eq!(latest_comment(&comments).unwrap().id, 11);
        assert!(latest_comment(&[]).is_none());
    }

    #[test]
    fn test_set_labels_serialization() {
        let labels = vec!["bug".to_string(), "docs".to_string()];
        let json = serde_json::to_string(&SetLabelsRequest { labels: &labels }).unwrap();
        assert_eq!(json, r#"{"labels":["bug","docs"]}"#);
    }

    #[test]
    fn test_next_page_url() {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::LINK,
            r#"<https://api.github.com/repos/o/r/issues?page=2>; rel="next", <https://api.github.com/repos/o/r/issues?page=5>; rel="last""#
                .parse()
                .unwrap(),
        );
        let next = next_page_url(&headers).unwrap();
        assert_eq!(next.as_str(), "https://api.github.com/repos/o/r/issues?page=2");
    }

    #[test]
    fn test_next_page_url_absent_on_last_page() {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::LINK,
            r#"<https://api.github.com/repos/o/r/issues?page=1>; rel="prev""#
                .parse()
                .unwrap(),
        );
        assert!(next_page_url(&headers).is_none());
        assert!(next_page_url(&header::HeaderMap::new()).is_none());
    }

    #[test]
    fn test_client_creation() {
        let config = GitHubConfig {
            owner: "octo".into(),
            repository: "tracker".into(),
            access_token: "t".into(),
            api_url: "https://api.github.com".into(),
        };
        let client = GitHubClient::new(&config).unwrap();
        assert_eq!(
            client.url("issues/1").unwrap().as_str(),
            "https://api.github.com/repos/octo/tracker/issues/1"
        );
    }
}
