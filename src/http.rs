//! Outbound HTTP plumbing shared by the registry, log-search and CI lookups.
//!
//! Only http/https targets are fetched, bodies are size-capped, and every
//! request runs on one shared client carrying the configured timeout.

use std::time::Duration;

/// Maximum response body size (2 MB). Registry records and job configs are small.
const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;

/// A fetched response: status plus body text.
#[derive(Debug, Clone)]
pub struct TextResponse {
    pub status: u16,
    pub body: String,
}

impl TextResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Build the shared client used for every lookup in a pass.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(concat!("stacksync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))
}

/// Parse a URL and require an http/https scheme.
pub fn validate_url(url: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("Invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!("Scheme \"{scheme}\" is not allowed; use http or https")),
    }
}

/// GET a URL and return its status and body text.
///
/// Network failures and oversized bodies are errors; non-2xx statuses are not,
/// callers decide what a 404 means.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<TextResponse, String> {
    let parsed = validate_url(url)?;

    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| format!("HTTP request failed: {e}"))?;

    let status = response.status().as_u16();

    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| format!("Failed to read response body: {e}"))?;

    if body_bytes.len() > MAX_RESPONSE_BYTES {
        return Err(format!(
            "Response body exceeds maximum size ({} bytes > {} bytes)",
            body_bytes.len(),
            MAX_RESPONSE_BYTES
        ));
    }

    Ok(TextResponse {
        status,
        body: String::from_utf8_lossy(&body_bytes).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_allows_https() {
        assert!(validate_url("https://config.example.com/apps/svc-foo").is_ok());
    }

    #[test]
    fn validate_allows_http() {
        assert!(validate_url("http://127.0.0.1:8080/apps").is_ok());
    }

    #[test]
    fn validate_blocks_file_scheme() {
        let result = validate_url("file:///etc/passwd");
        assert!(result.unwrap_err().contains("not allowed"));
    }

    #[test]
    fn validate_rejects_invalid_url() {
        let result = validate_url("not a url");
        assert!(result.unwrap_err().contains("Invalid URL"));
    }

    #[tokio::test]
    async fn get_text_returns_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("nope")
            .create_async()
            .await;

        let client = build_client(5).unwrap();
        let response = get_text(&client, &format!("{}/missing", server.url())).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "nope");
        assert!(!response.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_text_reports_connection_failure() {
        let client = build_client(1).unwrap();
        // Port 9 (discard) is closed on test machines
        let err = get_text(&client, "http://127.0.0.1:9/").await.unwrap_err();
        assert!(err.contains("HTTP request failed"));
    }
}
