//! Linear integration -- list assigned issues via the Linear GraphQL API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::IntegrationError;
use crate::integrations::keyring_store;
use crate::integrations::traits::{Integration, NextTask};

const SERVICE: &str = "linear";
const USER_AGENT: &str = "flowzo";
const DEFAULT_ENDPOINT: &str = "https://api.linear.app/graphql";
const API_KEY: &str = "linear_api_key";

const ASSIGNED_ISSUES_QUERY: &str = r#"
    query GetAssignedIssues($first: Int!) {
        viewer {
            assignedIssues(first: $first, filter: { state: { type: { nin: ["completed", "canceled"] } } }) {
                nodes {
                    id
                    identifier
                    title
                    description
                    state { name }
                    assignee { name }
                    labels { nodes { name } }
                    url
                    team { name }
                }
            }
        }
    }
"#;

const VIEWER_QUERY: &str = "query GetViewer { viewer { id name email } }";

pub struct LinearClient {
    api_key: String,
    endpoint: String,
    http: Client,
}

/// An open issue assigned to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearIssue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub url: String,
    pub team: String,
}

impl LinearIssue {
    fn from_json(node: &Value) -> Self {
        let labels = node["labels"]["nodes"]
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: node["id"].as_str().unwrap_or("").to_string(),
            identifier: node["identifier"].as_str().unwrap_or("UNKNOWN").to_string(),
            title: node["title"].as_str().unwrap_or("(No title)").to_string(),
            description: node["description"].as_str().map(str::to_string),
            state: node["state"]["name"].as_str().unwrap_or("Unknown").to_string(),
            assignee: node["assignee"]["name"].as_str().map(str::to_string),
            labels,
            url: node["url"].as_str().unwrap_or("").to_string(),
            team: node["team"]["name"].as_str().unwrap_or("").to_string(),
        }
    }

    pub fn to_next_task(&self) -> NextTask {
        NextTask {
            source: SERVICE.to_string(),
            key: self.identifier.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

/// The authenticated Linear account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearViewer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

impl Default for LinearClient {
    fn default() -> Self {
        Self::with_api_key("")
    }
}

impl LinearClient {
    /// Load stored API key from the OS keyring (empty string if absent).
    pub fn new() -> Self {
        let api_key = keyring_store::get(API_KEY)
            .ok()
            .flatten()
            .unwrap_or_default();
        Self::with_api_key(api_key)
    }

    /// Client with an explicit API key, bypassing the keyring.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http: Client::new(),
        }
    }

    /// Point the client at another GraphQL endpoint (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Run a GraphQL query and return its `data` member.
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, IntegrationError> {
        if !self.is_authenticated() {
            return Err(IntegrationError::NotAuthenticated { service: SERVICE });
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: resp.status(),
            });
        }

        let mut body: Value = resp.json().await?;
        if let Some(errors) = body.get("errors") {
            return Err(IntegrationError::GraphQl {
                service: SERVICE,
                message: errors.to_string(),
            });
        }
        match body.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(IntegrationError::MissingField {
                service: SERVICE,
                field: "data",
            }),
        }
    }

    /// Open issues assigned to the user (completed and canceled excluded).
    pub async fn fetch_assigned_issues(
        &self,
        limit: u32,
    ) -> Result<Vec<LinearIssue>, IntegrationError> {
        let data = self
            .graphql(ASSIGNED_ISSUES_QUERY, json!({ "first": limit }))
            .await?;

        let nodes = data["viewer"]["assignedIssues"]["nodes"]
            .as_array()
            .ok_or(IntegrationError::MissingField {
                service: SERVICE,
                field: "viewer.assignedIssues.nodes",
            })?;
        tracing::debug!(count = nodes.len(), "fetched linear issues");
        Ok(nodes.iter().map(LinearIssue::from_json).collect())
    }

    /// The first assigned open issue, if any.
    pub async fn next_issue(&self) -> Result<Option<LinearIssue>, IntegrationError> {
        Ok(self.fetch_assigned_issues(1).await?.into_iter().next())
    }

    /// Verify the API key by fetching the viewer.
    pub async fn test_connection(&self) -> Result<LinearViewer, IntegrationError> {
        let data = self.graphql(VIEWER_QUERY, json!({})).await?;
        let viewer = &data["viewer"];
        let id = viewer["id"].as_str().ok_or(IntegrationError::MissingField {
            service: SERVICE,
            field: "viewer.id",
        })?;
        Ok(LinearViewer {
            id: id.to_string(),
            name: viewer["name"].as_str().unwrap_or("").to_string(),
            email: viewer["email"].as_str().map(str::to_string),
        })
    }
}

impl Integration for LinearClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn display_name(&self) -> &'static str {
        "Linear"
    }

    fn credential_key(&self) -> &'static str {
        API_KEY
    }

    fn is_authenticated(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn set_credentials(&mut self, secret: &str) -> Result<(), IntegrationError> {
        keyring_store::set(API_KEY, secret)?;
        self.api_key = secret.to_string();
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), IntegrationError> {
        keyring_store::delete(API_KEY)?;
        self.api_key.clear();
        Ok(())
    }
}
