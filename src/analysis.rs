//! One analysis pass: classify, extract, look up, correlate, summarize.

use serde::{Deserialize, Serialize};

use crate::ci::JobConfigProbe;
use crate::config::Settings;
use crate::correlate::{self, CorrelationEntry, GenerateContext};
use crate::error_classification::Status;
use crate::extract::{self, DomAccess};
use crate::page::PageContext;
use crate::platform::{self, Platform};
use crate::registry::{self, AppDescriptor, RegistryLookup};

/// Result of analyzing one page, shipped as-is to the sidebar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub url: String,
    pub platform: Platform,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppDescriptor>,
    #[serde(default)]
    pub correlations: Vec<CorrelationEntry>,
    pub status: Status,
}

impl AnalysisReport {
    fn new(url: &str, platform: Platform, status: Status) -> Self {
        Self {
            url: url.to_string(),
            platform,
            project: None,
            app: None,
            correlations: Vec::new(),
            status,
        }
    }
}

/// Analyze `url` against one settings snapshot.
///
/// Never fails: every outcome, including transport errors, is a report whose
/// status says what happened.
pub async fn analyze(
    client: &reqwest::Client,
    settings: &Settings,
    url: &str,
    dom: Option<&dyn DomAccess>,
) -> AnalysisReport {
    let page = match PageContext::parse(url) {
        Ok(page) => page,
        Err(e) => {
            tracing::debug!("Skipping analysis: {e}");
            return AnalysisReport::new(url, Platform::Unknown, Status::invalid_page());
        }
    };

    let platform = platform::classify(&page, settings);
    let probe = JobConfigProbe::new(client.clone());
    let Some(identity) = extract::extract(&page, platform, dom, &probe).await else {
        return AnalysisReport::new(url, platform, Status::no_project());
    };
    let identity = extract::apply_naming_pattern(identity, &settings.naming_pattern);
    tracing::info!("Analyzing {identity} on {platform}");

    let mut report = AnalysisReport::new(url, platform, Status::no_project());
    report.project = Some(identity.clone());

    let descriptor = match registry::fetch_app_descriptor(client, &settings.registry_url, &identity).await {
        Ok(RegistryLookup::Found(descriptor)) => descriptor,
        Ok(RegistryLookup::NotFound) => {
            report.status = Status::app_not_found();
            return report;
        }
        Err(e) => {
            report.status = Status::from_lookup_error(&e);
            return report;
        }
    };

    let ctx = GenerateContext { client, settings };
    let correlations = correlate::generate(&ctx, &identity, platform, &descriptor).await;
    report.status = Status::found(correlations.len());
    report.correlations = correlations;
    report.app = Some(descriptor);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfig;
    use crate::correlate::CorrelationTarget;
    use crate::error_classification::StatusLevel;
    use crate::http;

    fn settings(registry_url: String) -> Settings {
        Settings {
            registry_url,
            ci_url: "https://jenkins.example.com".into(),
            environments: vec![EnvironmentConfig::new("DEV"), EnvironmentConfig::new("PROD")],
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn invalid_url_reports_unable_to_analyze() {
        let client = http::build_client(2).unwrap();
        let report = analyze(&client, &Settings::default(), "not a url", None).await;
        assert_eq!(report.status, Status::invalid_page());
        assert_eq!(report.platform, Platform::Unknown);
    }

    #[tokio::test]
    async fn unknown_page_reports_no_project() {
        let client = http::build_client(2).unwrap();
        let report = analyze(&client, &Settings::default(), "https://news.example.com/", None).await;
        assert_eq!(report.status.message, "No project detected");
        assert!(report.project.is_none());
        assert!(report.correlations.is_empty());
    }

    #[tokio::test]
    async fn missing_registry_url_is_a_config_status() {
        let client = http::build_client(2).unwrap();
        let report = analyze(
            &client,
            &Settings::default(),
            "https://gitlab.example.com/grp/svc-foo",
            None,
        )
        .await;
        assert_eq!(report.project.as_deref(), Some("svc-foo"));
        assert_eq!(report.status.message, "Config service URL not configured");
        assert_eq!(report.status.level, StatusLevel::Error);
    }

    #[tokio::test]
    async fn not_found_and_server_error_report_different_statuses() {
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

        let client = http::build_client(2).unwrap();
        let settings = settings(format!("{}/apps", server.url()));

        let missing = analyze(&client, &settings, "https://gitlab.example.com/grp/svc-missing", None).await;
        assert_eq!(missing.status.message, "App not found in config service");
        assert_eq!(missing.status.level, StatusLevel::Warning);

        let broken = analyze(&client, &settings, "https://gitlab.example.com/grp/svc-broken", None).await;
        assert_eq!(broken.status.message, "Error loading correlations");
        assert_eq!(broken.status.level, StatusLevel::Error);
        assert!(broken.correlations.is_empty());
    }

    #[tokio::test]
    async fn full_pass_from_source_control() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/apps/svc-foo")
            .with_status(200)
            .with_body(r#"{"type":"service","product":"pay","jobId":"fwrk-dev-svc-foo","gitURL":"git@gitlab.co:grp/svc-foo.git"}"#)
            .create_async()
            .await;

        let client = http::build_client(2).unwrap();
        let settings = settings(format!("{}/apps", server.url()));
        let report = analyze(&client, &settings, "https://gitlab.example.com/grp/svc-foo/-/tree/main", None).await;

        assert_eq!(report.platform, Platform::SourceControl);
        assert_eq!(report.project.as_deref(), Some("svc-foo"));
        assert_eq!(report.app.as_ref().map(|a| a.product.as_str()), Some("pay"));
        assert_eq!(report.correlations.len(), 3);
        assert_eq!(report.status.message, "Found 3 correlations");
        assert_eq!(
            report.correlations.last().map(|c| c.target),
            Some(CorrelationTarget::Configuration)
        );
    }

    #[tokio::test]
    async fn naming_pattern_normalizes_identity_before_lookup() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/apps/svc-foo")
            .with_status(404)
            .create_async()
            .await;

        let client = http::build_client(2).unwrap();
        let mut settings = settings(format!("{}/apps", server.url()));
        settings.naming_pattern = r"^(?P<name>.+)-prod$".into();
        let report = analyze(&client, &settings, "https://gitlab.example.com/grp/svc-foo-prod", None).await;

        assert_eq!(report.project.as_deref(), Some("svc-foo"));
        mock.assert_async().await;
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = AnalysisReport::new("https://x.example.com/", Platform::Ci, Status::no_project());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["platform"], "ci");
        assert_eq!(json["status"]["level"], "warning");
        assert!(json.get("app").is_none());
    }
}
