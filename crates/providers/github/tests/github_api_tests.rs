//! Integration tests for the GitHub adapter against a mock API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use appsleuth_core::fetch::{FetchClient, ReqwestTransport};
use appsleuth_core::providers::{ProjectId, ProjectProvider, ProviderRequest};
use appsleuth_core::{Error, ProviderKind};
use appsleuth_provider_github::GitHubProvider;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> FetchClient {
    FetchClient::new(Arc::new(
        ReqwestTransport::new("appsleuth-test", Duration::from_secs(5)).unwrap(),
    ))
}

fn project() -> ProjectId {
    ProjectId::owned(ProviderKind::GitHub, "owner", "app")
}

#[tokio::test]
async fn metadata_uses_owner_display_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/app"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "app",
            "description": "Does things",
            "private": false,
            "fork": true,
            "homepage": "",
            "html_url": "https://github.com/owner/app",
            "owner": { "login": "owner" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": "owner",
            "name": "Owner Software"
        })))
        .mount(&server)
        .await;

    let client = client();
    let project = project();
    let request = ProviderRequest {
        project: &project,
        client: &client,
        token: Some("secret"),
    };
    let metadata = GitHubProvider::with_api_base(server.uri())
        .fetch_metadata(&request)
        .await
        .unwrap();

    assert_eq!(metadata.name.as_deref(), Some("app"));
    assert_eq!(metadata.description.as_deref(), Some("Does things"));
    assert!(metadata.is_fork);
    assert!(!metadata.is_private);
    assert_eq!(metadata.developer.as_deref(), Some("Owner Software"));
    assert_eq!(metadata.homepage.as_deref(), Some("https://github.com/owner/app"));
}

#[tokio::test]
async fn metadata_falls_back_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "app",
            "description": null,
            "owner": { "login": "owner" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/owner"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client();
    let project = project();
    let request = ProviderRequest {
        project: &project,
        client: &client,
        token: None,
    };
    let metadata = GitHubProvider::with_api_base(server.uri())
        .fetch_metadata(&request)
        .await
        .unwrap();

    assert_eq!(metadata.developer.as_deref(), Some("owner"));
    assert_eq!(metadata.description, None);
}

#[tokio::test]
async fn latest_release_skips_drafts_and_prereleases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/app/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "tag_name": "v3.0-beta",
                "prerelease": true,
                "assets": [{ "name": "App-3.0b.dmg", "browser_download_url": "https://example.com/beta.dmg" }]
            },
            {
                "tag_name": "v2.0",
                "draft": true,
                "assets": []
            },
            {
                "tag_name": "v1.0",
                "assets": [
                    { "name": "App-1.0.zip", "browser_download_url": "https://example.com/App-1.0.zip" },
                    { "name": "App-1.0-arm64.dmg", "browser_download_url": "https://example.com/arm64.dmg" },
                    { "name": "App-1.0-x64.dmg", "browser_download_url": "https://example.com/x64.dmg" }
                ]
            }
        ])))
        .mount(&server)
        .await;

    let client = client();
    let project = project();
    let request = ProviderRequest {
        project: &project,
        client: &client,
        token: None,
    };
    let release = GitHubProvider::with_api_base(server.uri())
        .fetch_latest_release(&request)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(release.version.as_deref(), Some("v1.0"));
    assert_eq!(release.download_format, "dmg");
    assert_eq!(release.download_url, "https://example.com/arm64.dmg");
    assert!(release.needs_asset_filter);
}

#[tokio::test]
async fn no_releases_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/app/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client();
    let project = project();
    let request = ProviderRequest {
        project: &project,
        client: &client,
        token: None,
    };
    let release = GitHubProvider::with_api_base(server.uri())
        .fetch_latest_release(&request)
        .await
        .unwrap();
    assert!(release.is_none());
}

#[tokio::test]
async fn rate_limit_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = client();
    let project = project();
    let request = ProviderRequest {
        project: &project,
        client: &client,
        token: None,
    };
    let error = GitHubProvider::with_api_base(server.uri())
        .fetch_latest_release(&request)
        .await
        .unwrap_err();

    match error {
        Error::Provider { provider, message } => {
            assert_eq!(provider, "github");
            assert!(message.contains("rate limited"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
