//! Per-pass view of the page being analyzed.

use url::Url;

/// Immutable snapshot of the active page's location.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    pub url: Url,
    /// Lower-cased host (empty for host-less URLs)
    pub hostname: String,
    /// Path split on `/`, empty segments removed
    pub segments: Vec<String>,
}

impl PageContext {
    /// Parse an absolute URL into a page context.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw.trim()).map_err(|e| format!("Invalid page URL {raw:?}: {e}"))?;
        Ok(Self::from_url(url))
    }

    pub fn from_url(url: Url) -> Self {
        let hostname = url.host_str().unwrap_or_default().to_lowercase();
        let segments = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            url,
            hostname,
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}
