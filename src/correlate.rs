//! Correlation generator: turn an app descriptor into navigation links.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::ci;
use crate::config::{EnvironmentConfig, Settings};
use crate::logsearch;
use crate::platform::Platform;
use crate::registry::{self, AppDescriptor};
use crate::scm;

/// Environments with a fixed rank; everything else follows in settings order.
const RANKED_ENVIRONMENTS: [&str; 3] = ["DEV", "TEST", "PROD"];

/// Where a correlation entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationTarget {
    LogSearch,
    SourceControl,
    Ci,
    /// The app's own registry record
    Configuration,
}

impl CorrelationTarget {
    /// The browsable platform this target maps to, if any.
    pub fn platform(self) -> Option<Platform> {
        match self {
            CorrelationTarget::LogSearch => Some(Platform::LogSearch),
            CorrelationTarget::SourceControl => Some(Platform::SourceControl),
            CorrelationTarget::Ci => Some(Platform::Ci),
            CorrelationTarget::Configuration => None,
        }
    }

    fn group_rank(self) -> u8 {
        match self {
            CorrelationTarget::LogSearch => 0,
            CorrelationTarget::SourceControl => 1,
            CorrelationTarget::Ci => 2,
            CorrelationTarget::Configuration => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationEntry {
    pub target: CorrelationTarget,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default)]
    pub is_current_environment: bool,
}

impl CorrelationEntry {
    fn new(target: CorrelationTarget, title: String, url: String) -> Self {
        Self {
            target,
            title,
            url,
            environment: None,
            is_current_environment: false,
        }
    }

    fn in_environment(mut self, settings: &Settings, environment: &str) -> Self {
        self.is_current_environment = settings.is_current_environment(environment);
        self.environment = Some(environment.to_string());
        self
    }
}

/// Everything a generation pass reads besides the descriptor.
pub struct GenerateContext<'a> {
    pub client: &'a reqwest::Client,
    pub settings: &'a Settings,
}

/// Build the correlation list for `identifier` as seen from `current`.
///
/// Never returns an entry pointing back at `current`; the configuration
/// entry is always present. Output is sorted by [`sort_entries`].
pub async fn generate(
    ctx: &GenerateContext<'_>,
    identifier: &str,
    current: Platform,
    descriptor: &AppDescriptor,
) -> Vec<CorrelationEntry> {
    let settings = ctx.settings;
    let wanted = |target: CorrelationTarget| target.platform() != Some(current);
    let mut entries = Vec::new();

    if wanted(CorrelationTarget::LogSearch) {
        let lookups = settings
            .environments
            .iter()
            .map(|env| log_search_entry(ctx, identifier, &descriptor.product, env));
        entries.extend(join_all(lookups).await.into_iter().flatten());
    }

    if wanted(CorrelationTarget::SourceControl)
        && let Some(web_url) = descriptor.source_repo_url.as_deref().and_then(scm::remote_to_web_url)
    {
        entries.push(CorrelationEntry::new(
            CorrelationTarget::SourceControl,
            format!("View in {}", Platform::SourceControl.label()),
            web_url,
        ));
    }

    if wanted(CorrelationTarget::Ci)
        && let Some(base_job_id) = descriptor.ci_job_id.as_deref().filter(|id| !id.trim().is_empty())
    {
        for env in &settings.environments {
            let Some(ci_base) = ci_base_for(settings, env) else {
                continue;
            };
            let job_id = ci::environment_job_id(base_job_id.trim(), &env.name);
            entries.push(
                CorrelationEntry::new(
                    CorrelationTarget::Ci,
                    format!("View in {} ({})", Platform::Ci.label(), env.name),
                    ci::job_url(ci_base, &job_id),
                )
                .in_environment(settings, &env.name),
            );
        }
    }

    entries.push(CorrelationEntry::new(
        CorrelationTarget::Configuration,
        "View App Configuration".to_string(),
        registry::record_url(&settings.registry_url, identifier),
    ));

    sort_entries(&mut entries, &settings.environments);
    entries
}

/// Log-search link for one environment: the lookup service first, then a
/// locally built discover URL.
async fn log_search_entry(
    ctx: &GenerateContext<'_>,
    identifier: &str,
    product: &str,
    env: &EnvironmentConfig,
) -> Option<CorrelationEntry> {
    let settings = ctx.settings;
    let url = match logsearch::fetch_log_search_url(
        ctx.client,
        &settings.log_search_service_url,
        identifier,
        product,
        &env.name,
    )
    .await
    {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Log-search lookup for {identifier} in {} unavailable: {e}", env.name);
            let base = env
                .log_search_base_url
                .as_deref()
                .or(Some(settings.log_search_url.as_str()))
                .filter(|b| !b.is_empty())?;
            logsearch::discover_url(base, identifier)
        }
    };

    Some(
        CorrelationEntry::new(
            CorrelationTarget::LogSearch,
            format!("View Logs in {} ({})", Platform::LogSearch.label(), env.name),
            url,
        )
        .in_environment(settings, &env.name),
    )
}

fn ci_base_for<'a>(settings: &'a Settings, env: &'a EnvironmentConfig) -> Option<&'a str> {
    env.ci_base_url
        .as_deref()
        .or(Some(settings.ci_url.as_str()))
        .filter(|b| !b.is_empty())
}

/// Rank of an environment name: DEV, TEST, PROD, then the rest in the order
/// they first appear in `environments`. Unknown names sort after all of them.
fn environment_rank(name: &str, environments: &[EnvironmentConfig]) -> usize {
    if let Some(idx) = RANKED_ENVIRONMENTS.iter().position(|r| r.eq_ignore_ascii_case(name)) {
        return idx;
    }
    let others = environments
        .iter()
        .filter(|e| !RANKED_ENVIRONMENTS.iter().any(|r| r.eq_ignore_ascii_case(&e.name)));
    match others.clone().position(|e| e.name.eq_ignore_ascii_case(name)) {
        Some(idx) => RANKED_ENVIRONMENTS.len() + idx,
        None => RANKED_ENVIRONMENTS.len() + others.count(),
    }
}

/// Stable sort by target group, then environment rank. Entries without an
/// environment come first within their group.
pub fn sort_entries(entries: &mut [CorrelationEntry], environments: &[EnvironmentConfig]) {
    entries.sort_by(|a, b| {
        a.target
            .group_rank()
            .cmp(&b.target.group_rank())
            .then_with(|| match (&a.environment, &b.environment) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => {
                    environment_rank(x, environments).cmp(&environment_rank(y, environments))
                }
            })
    });
}
