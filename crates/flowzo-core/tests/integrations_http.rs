//! Tracker clients against mocked HTTP endpoints.
//!
//! Clients are built with explicit credentials so the OS keyring is never
//! touched.

use flowzo_core::integrations::{GitHubClient, LinearClient};
use flowzo_core::IntegrationError;
use mockito::Matcher;
use serde_json::json;

// ============================================================================
// GitHub
// ============================================================================

#[tokio::test]
async fn test_github_fetches_assigned_issues() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/issues")
        .match_header("authorization", "Bearer ghp_test")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("filter".into(), "assigned".into()),
            Matcher::UrlEncoded("state".into(), "open".into()),
            Matcher::UrlEncoded("per_page".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {
                    "number": 12,
                    "title": "Flaky test",
                    "body": null,
                    "state": "open",
                    "assignee": {"login": "me"},
                    "labels": [{"name": "ci"}],
                    "html_url": "https://github.com/acme/app/issues/12",
                    "repository_url": "https://api.github.com/repos/acme/app"
                },
                {
                    "number": 3,
                    "title": "Review docs",
                    "state": "open",
                    "labels": [],
                    "html_url": "https://github.com/acme/docs/pull/3",
                    "repository_url": "https://api.github.com/repos/acme/docs",
                    "pull_request": {"url": "https://api.github.com/repos/acme/docs/pulls/3"}
                }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let client = GitHubClient::with_token("ghp_test").with_base_url(server.url());
    let issues = client.fetch_assigned_issues(5).await.unwrap();

    mock.assert_async().await;
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].to_next_task().key, "acme/app#12");
    assert_eq!(issues[0].labels, vec!["ci"]);
    assert!(issues[1].is_pull_request);
}

#[tokio::test]
async fn test_github_next_issue_empty_list() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/issues")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let client = GitHubClient::with_token("ghp_test").with_base_url(server.url());
    assert!(client.next_issue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_github_bad_token_reports_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/user")
        .with_status(401)
        .with_body(r#"{"message": "Bad credentials"}"#)
        .create_async()
        .await;

    let client = GitHubClient::with_token("ghp_revoked").with_base_url(server.url());
    let err = client.test_connection().await.unwrap_err();
    match err {
        IntegrationError::Status { service, status } => {
            assert_eq!(service, "github");
            assert_eq!(status.as_u16(), 401);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_github_test_connection_returns_login() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/user")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"login": "octocat", "name": "The Octocat"}"#)
        .create_async()
        .await;

    let client = GitHubClient::with_token("ghp_test").with_base_url(server.url());
    let user = client.test_connection().await.unwrap();
    assert_eq!(user.login, "octocat");
    assert_eq!(user.name.as_deref(), Some("The Octocat"));
}

// ============================================================================
// Linear
// ============================================================================

#[tokio::test]
async fn test_linear_fetches_assigned_issues() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "lin_api_test")
        .match_body(Matcher::PartialJson(json!({"variables": {"first": 3}})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": {
                    "viewer": {
                        "assignedIssues": {
                            "nodes": [{
                                "id": "abc",
                                "identifier": "ENG-7",
                                "title": "Ship the thing",
                                "description": "Soon",
                                "state": {"name": "Todo"},
                                "assignee": {"name": "Me"},
                                "labels": {"nodes": []},
                                "url": "https://linear.app/acme/issue/ENG-7",
                                "team": {"name": "Engineering"}
                            }]
                        }
                    }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = LinearClient::with_api_key("lin_api_test").with_endpoint(server.url());
    let issues = client.fetch_assigned_issues(3).await.unwrap();

    mock.assert_async().await;
    assert_eq!(issues.len(), 1);
    let task = issues[0].to_next_task();
    assert_eq!(task.source, "linear");
    assert_eq!(task.key, "ENG-7");
    assert_eq!(task.title, "Ship the thing");
}

#[tokio::test]
async fn test_linear_graphql_errors_surface() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"errors": [{"message": "Authentication required"}]}"#)
        .create_async()
        .await;

    let client = LinearClient::with_api_key("lin_api_bad").with_endpoint(server.url());
    let err = client.next_issue().await.unwrap_err();
    match err {
        IntegrationError::GraphQl { service, message } => {
            assert_eq!(service, "linear");
            assert!(message.contains("Authentication required"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_linear_test_connection_returns_viewer() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": {"viewer": {"id": "u1", "name": "Ada", "email": null}}}"#)
        .create_async()
        .await;

    let client = LinearClient::with_api_key("lin_api_test").with_endpoint(server.url());
    let viewer = client.test_connection().await.unwrap();
    assert_eq!(viewer.id, "u1");
    assert_eq!(viewer.name, "Ada");
    assert!(viewer.email.is_none());
}
