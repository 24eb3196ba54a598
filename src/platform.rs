//! Platform classification: which of the correlated UIs a page belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Settings;
use crate::page::PageContext;

/// The external UIs this tool correlates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    LogSearch,
    SourceControl,
    Ci,
    Unknown,
}

impl Platform {
    /// The three real platforms, in configured-host priority order.
    pub const KNOWN: [Platform; 3] = [Platform::LogSearch, Platform::Ci, Platform::SourceControl];

    pub fn label(self) -> &'static str {
        match self {
            Platform::LogSearch => "Elastic",
            Platform::SourceControl => "GitLab",
            Platform::Ci => "Jenkins",
            Platform::Unknown => "Unknown",
        }
    }

    fn host_keywords(self) -> &'static [&'static str] {
        match self {
            Platform::LogSearch => &["elastic", "kibana"],
            Platform::SourceControl => &["gitlab"],
            Platform::Ci => &["jenkins"],
            Platform::Unknown => &[],
        }
    }

    fn path_keywords(self) -> &'static [&'static str] {
        match self {
            Platform::LogSearch => &["/app/discover", "/app/kibana"],
            Platform::SourceControl => &["/-/", "/merge_requests", "/issues"],
            Platform::Ci => &["/job/", "/build/"],
            Platform::Unknown => &[],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Keyword fallbacks are checked in this order (first match wins).
const KEYWORD_ORDER: [Platform; 3] = [Platform::LogSearch, Platform::SourceControl, Platform::Ci];

/// Lower-cased hostname of a configured base URL, or None if unset/unparseable.
fn configured_host(base_url: &str) -> Option<String> {
    if base_url.is_empty() {
        return None;
    }
    let parsed = url::Url::parse(base_url).ok()?;
    parsed
        .host_str()
        .map(str::to_lowercase)
        .filter(|h| !h.is_empty())
}

/// Decide which platform a page belongs to.
///
/// Configured hosts win over hostname keywords, which win over URL path keywords.
pub fn classify(page: &PageContext, settings: &Settings) -> Platform {
    let hostname = page.hostname.as_str();

    for platform in Platform::KNOWN {
        if let Some(host) = configured_host(settings.base_url_for(platform))
            && (hostname == host || hostname.contains(&host))
        {
            return platform;
        }
    }

    for platform in KEYWORD_ORDER {
        if platform.host_keywords().iter().any(|k| hostname.contains(k)) {
            return platform;
        }
    }

    let full_url = page.as_str().to_lowercase();
    for platform in KEYWORD_ORDER {
        if platform.path_keywords().iter().any(|k| full_url.contains(k)) {
            return platform;
        }
    }

    Platform::Unknown
}
