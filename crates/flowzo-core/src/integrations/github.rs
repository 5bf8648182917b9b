//! GitHub integration -- list issues assigned to the authenticated user.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IntegrationError;
use crate::integrations::keyring_store;
use crate::integrations::traits::{Integration, NextTask};

const SERVICE: &str = "github";
const USER_AGENT: &str = "flowzo";
const DEFAULT_BASE_URL: &str = "https://api.github.com";
const TOKEN_KEY: &str = "github_token";

pub struct GitHubClient {
    token: String,
    base_url: String,
    http: Client,
}

/// An issue or pull request assigned to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub html_url: String,
    /// `owner/repo`
    pub repository: String,
    pub is_pull_request: bool,
}

impl GitHubIssue {
    fn from_json(item: &Value) -> Self {
        let repository = item["repository_url"]
            .as_str()
            .map(|url| {
                let mut parts = url.rsplit('/');
                let repo = parts.next().unwrap_or_default();
                let owner = parts.next().unwrap_or_default();
                format!("{owner}/{repo}")
            })
            .unwrap_or_else(|| "unknown".to_string());

        let labels = item["labels"]
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            number: item["number"].as_i64().unwrap_or(0),
            title: item["title"].as_str().unwrap_or("(No title)").to_string(),
            body: item["body"].as_str().map(str::to_string),
            state: item["state"].as_str().unwrap_or("unknown").to_string(),
            assignee: item["assignee"]["login"].as_str().map(str::to_string),
            labels,
            html_url: item["html_url"].as_str().unwrap_or("").to_string(),
            repository,
            is_pull_request: item.get("pull_request").is_some(),
        }
    }

    pub fn to_next_task(&self) -> NextTask {
        NextTask {
            source: SERVICE.to_string(),
            key: format!("{}#{}", self.repository, self.number),
            title: self.title.clone(),
            url: self.html_url.clone(),
        }
    }
}

/// The authenticated GitHub account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub name: Option<String>,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::with_token("")
    }
}

impl GitHubClient {
    /// Load stored token from the OS keyring (empty string if absent).
    pub fn new() -> Self {
        let token = keyring_store::get(TOKEN_KEY)
            .ok()
            .flatten()
            .unwrap_or_default();
        Self::with_token(token)
    }

    /// Client with an explicit token, bypassing the keyring.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    /// Point the client at another API root (GitHub Enterprise, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, IntegrationError> {
        if !self.is_authenticated() {
            return Err(IntegrationError::NotAuthenticated { service: SERVICE });
        }

        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .query(query)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: resp.status(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Open issues and pull requests assigned to the user, most recently
    /// updated first.
    pub async fn fetch_assigned_issues(
        &self,
        limit: u32,
    ) -> Result<Vec<GitHubIssue>, IntegrationError> {
        let data = self
            .get(
                "issues",
                &[
                    ("filter", "assigned".to_string()),
                    ("state", "open".to_string()),
                    ("sort", "updated".to_string()),
                    ("direction", "desc".to_string()),
                    ("per_page", limit.to_string()),
                ],
            )
            .await?;

        let items = data.as_array().ok_or(IntegrationError::MissingField {
            service: SERVICE,
            field: "issue list",
        })?;
        tracing::debug!(count = items.len(), "fetched github issues");
        Ok(items.iter().map(GitHubIssue::from_json).collect())
    }

    /// The first assigned open issue, if any.
    pub async fn next_issue(&self) -> Result<Option<GitHubIssue>, IntegrationError> {
        Ok(self.fetch_assigned_issues(1).await?.into_iter().next())
    }

    /// Verify the token by fetching the authenticated user.
    pub async fn test_connection(&self) -> Result<GitHubUser, IntegrationError> {
        let data = self.get("user", &[]).await?;
        let login = data["login"]
            .as_str()
            .ok_or(IntegrationError::MissingField {
                service: SERVICE,
                field: "login",
            })?
            .to_string();
        Ok(GitHubUser {
            login,
            name: data["name"].as_str().map(str::to_string),
        })
    }
}

impl Integration for GitHubClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn display_name(&self) -> &'static str {
        "GitHub"
    }

    fn credential_key(&self) -> &'static str {
        TOKEN_KEY
    }

    fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    fn set_credentials(&mut self, secret: &str) -> Result<(), IntegrationError> {
        keyring_store::set(TOKEN_KEY, secret)?;
        self.token = secret.to_string();
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), IntegrationError> {
        keyring_store::delete(TOKEN_KEY)?;
        self.token.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_issue_fields() {
        let issue = GitHubIssue::from_json(&json!({
            "number": 123,
            "title": "Test Issue",
            "body": "Test description",
            "state": "open",
            "assignee": {"login": "test_user"},
            "labels": [{"name": "bug"}, {"name": "priority:high"}],
            "html_url": "https://github.com/owner/repo/issues/123",
            "repository_url": "https://api.github.com/repos/owner/repo"
        }));
        assert_eq!(issue.number, 123);
        assert_eq!(issue.repository, "owner/repo");
        assert_eq!(issue.assignee.as_deref(), Some("test_user"));
        assert_eq!(issue.labels, vec!["bug", "priority:high"]);
        assert!(!issue.is_pull_request);
        assert_eq!(issue.to_next_task().key, "owner/repo#123");
    }

    #[test]
    fn missing_fields_fall_back() {
        let issue = GitHubIssue::from_json(&json!({
            "number": 7,
            "body": null,
            "assignee": null,
            "pull_request": {}
        }));
        assert_eq!(issue.title, "(No title)");
        assert!(issue.body.is_none());
        assert!(issue.assignee.is_none());
        assert!(issue.labels.is_empty());
        assert!(issue.is_pull_request);
        assert_eq!(issue.repository, "unknown");
    }

    #[tokio::test]
    async fn unauthenticated_client_refuses_requests() {
        let client = GitHubClient::with_token("");
        assert!(!client.is_authenticated());
        let err = client.fetch_assigned_issues(5).await.unwrap_err();
        assert!(matches!(err, IntegrationError::NotAuthenticated { service: "github" }));
    }

    #[test]
    fn identifies_service_and_keyring_entry() {
        let client = GitHubClient::with_token("");
        assert_eq!(client.name(), "github");
        assert_eq!(client.credential_key(), "github_token");
    }
}
