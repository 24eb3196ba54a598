//! App registry client: resolve a project identifier to its app descriptor.

use serde::{Deserialize, Serialize};

use crate::error_classification::LookupError;
use crate::http;

/// App metadata held by the registry (config service).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDescriptor {
    #[serde(rename = "type", default)]
    pub app_type: String,
    #[serde(default)]
    pub product: String,
    #[serde(rename = "desc", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Git remote of the app's repository (SSH or HTTPS form)
    #[serde(rename = "gitURL", default, skip_serializing_if = "Option::is_none")]
    pub source_repo_url: Option<String>,
    /// Base CI job identifier; environment variants are derived from it
    #[serde(rename = "jobId", default, skip_serializing_if = "Option::is_none")]
    pub ci_job_id: Option<String>,
}

/// Outcome of a registry lookup that reached the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryLookup {
    Found(AppDescriptor),
    /// The registry answered 404: the app is simply not registered
    NotFound,
}

/// `{base_url}/{identifier}`, the record URL for an app.
pub fn record_url(base_url: &str, identifier: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(identifier)
    )
}

/// Fetch the descriptor for `identifier`.
///
/// 404 is `NotFound`, not an error. Every other non-success status, network
/// failure, or unparseable body is a transport error. No retry.
pub async fn fetch_app_descriptor(
    client: &reqwest::Client,
    base_url: &str,
    identifier: &str,
) -> Result<RegistryLookup, LookupError> {
    if base_url.trim().is_empty() {
        return Err(LookupError::Config("registry URL is empty".to_string()));
    }
    let url = record_url(base_url.trim(), identifier);

    let response = http::get_text(client, &url).await.map_err(|e| {
        tracing::warn!("Registry lookup for {identifier} failed: {e}");
        LookupError::Transport(e)
    })?;

    if response.status == 404 {
        return Ok(RegistryLookup::NotFound);
    }
    if !response.is_success() {
        tracing::warn!("Registry returned HTTP {} for {identifier}", response.status);
        return Err(LookupError::Transport(format!("HTTP {}", response.status)));
    }

    let descriptor: AppDescriptor = serde_json::from_str(&response.body).map_err(|e| {
        tracing::warn!("Registry returned an unreadable descriptor for {identifier}: {e}");
        LookupError::Transport(format!("Failed to parse app descriptor JSON: {e}"))
    })?;

    Ok(RegistryLookup::Found(descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialise_descriptor() {
        let json = r#"{
            "type": "service",
            "product": "pay",
            "desc": "Payment gateway",
            "gitURL": "git@gitlab.co:grp/svc-foo.git",
            "jobId": "fwrk-dev-svc-foo"
        }"#;

        let descriptor: AppDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.app_type, "service");
        assert_eq!(descriptor.product, "pay");
        assert_eq!(descriptor.description.as_deref(), Some("Payment gateway"));
        assert_eq!(descriptor.source_repo_url.as_deref(), Some("git@gitlab.co:grp/svc-foo.git"));
        assert_eq!(descriptor.ci_job_id.as_deref(), Some("fwrk-dev-svc-foo"));
    }

    #[test]
    fn deserialise_minimal_descriptor() {
        let descriptor: AppDescriptor = serde_json::from_str(r#"{"product": "pay"}"#).unwrap();
        assert_eq!(descriptor.app_type, "");
        assert!(descriptor.description.is_none());
        assert!(descriptor.source_repo_url.is_none());
        assert!(descriptor.ci_job_id.is_none());
    }

    #[test]
    fn record_url_joins_and_encodes() {
        assert_eq!(
            record_url("https://config.example.com/apps/", "svc-foo"),
            "https://config.example.com/apps/svc-foo"
        );
        assert_eq!(
            record_url("https://config.example.com/apps", "svc foo"),
            "https://config.example.com/apps/svc%20foo"
        );
    }

    #[tokio::test]
    async fn found_descriptor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/apps/svc-foo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type":"service","product":"pay","jobId":"fwrk-dev-svc-foo"}"#)
            .create_async()
            .await;

        let client = http::build_client(5).unwrap();
        let base = format!("{}/apps", server.url());
        let lookup = fetch_app_descriptor(&client, &base, "svc-foo").await.unwrap();
        let RegistryLookup::Found(descriptor) = lookup else {
            panic!("expected a descriptor, got {lookup:?}");
        };
        assert_eq!(descriptor.product, "pay");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_is_distinct_from_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/apps/svc-missing")
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/apps/svc-broken")
            .with_status(500)
            .create_async()
            .await;

        let client = http::build_client(5).unwrap();
        let base = format!("{}/apps", server.url());

        let missing = fetch_app_descriptor(&client, &base, "svc-missing").await;
        assert_eq!(missing, Ok(RegistryLookup::NotFound));

        let broken = fetch_app_descriptor(&client, &base, "svc-broken").await;
        assert_eq!(broken, Err(LookupError::Transport("HTTP 500".to_string())));
    }

    #[tokio::test]
    async fn unparseable_body_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/svc-foo")
            .with_status(200)
            .with_body("<html>login</html>")
            .create_async()
            .await;

        let client = http::build_client(5).unwrap();
        let err = fetch_app_descriptor(&client, &server.url(), "svc-foo").await.unwrap_err();
        assert!(matches!(err, LookupError::Transport(ref m) if m.contains("parse")));
    }

    #[tokio::test]
    async fn missing_base_url_is_config_error() {
        let client = http::build_client(5).unwrap();
        let err = fetch_app_descriptor(&client, "  ", "svc-foo").await.unwrap_err();
        assert!(matches!(err, LookupError::Config(_)));
    }
}
