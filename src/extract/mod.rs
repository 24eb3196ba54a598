//! Best-effort project identity extraction.
//!
//! Each platform has two ordered rule chains. The primary chain reads the live
//! page (and, for CI, the job's config.xml); the fallback chain reads only the
//! URL. The first rule producing a non-empty value wins. Rules never fail:
//! anything that goes wrong inside one is a miss and the chain moves on.

pub mod dom;
pub mod rules;

use regex::Regex;

pub use dom::{DomAccess, DomNode, DomSnapshot};
pub use rules::Rule;

use crate::ci::JobConfigProbe;
use crate::page::PageContext;
use crate::platform::Platform;

async fn run_chain(
    chain: &[Rule],
    page: &PageContext,
    dom: Option<&dyn DomAccess>,
    probe: &JobConfigProbe,
) -> Option<String> {
    for rule in chain {
        let found = match rule {
            Rule::JobConfig => probe.app_name(&page.url).await,
            other => other.apply(page, dom),
        };
        if let Some(value) = found {
            return Some(value);
        }
    }
    None
}

/// Extract the project identifier for a page on `platform`.
///
/// With `dom` the primary chain runs first; the URL-only fallback chain runs
/// when there is no DOM access or the primary chain found nothing.
pub async fn extract(
    page: &PageContext,
    platform: Platform,
    dom: Option<&dyn DomAccess>,
    probe: &JobConfigProbe,
) -> Option<String> {
    if let Some(dom) = dom
        && let Some(found) = run_chain(&rules::primary_rules(platform), page, Some(dom), probe).await
    {
        tracing::debug!("Primary {platform} rules matched {found:?}");
        return Some(found);
    }

    let found = run_chain(&rules::fallback_rules(platform), page, None, probe).await;
    match &found {
        Some(value) => tracing::debug!("URL {platform} rules matched {value:?}"),
        None => tracing::debug!("No {platform} rule matched {}", page.as_str()),
    }
    found
}

/// CSS selectors the sidebar should snapshot for a platform's primary rules.
pub fn selectors_for(platform: Platform) -> Vec<&'static str> {
    let mut selectors: Vec<&'static str> = Vec::new();
    for selector in rules::primary_rules(platform).iter().filter_map(Rule::selector) {
        if !selectors.contains(&selector) {
            selectors.push(selector);
        }
    }
    selectors
}

/// Normalize an identifier with the user's naming pattern.
///
/// The named group `name` wins, then capture group 1. No match, an empty
/// pattern, or an invalid pattern leaves the identifier unchanged.
pub fn apply_naming_pattern(identity: String, pattern: &str) -> String {
    if pattern.is_empty() {
        return identity;
    }
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Ignoring invalid naming pattern {pattern:?}: {e}");
            return identity;
        }
    };
    let Some(caps) = re.captures(&identity) else {
        return identity;
    };
    caps.name("name")
        .or_else(|| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or(identity)
}
