//! Extraction rule tables, one ordered chain per (platform, tier).

use lazy_static::lazy_static;
use regex::Regex;

use super::dom::DomAccess;
use crate::ci;
use crate::page::PageContext;
use crate::platform::Platform;

lazy_static! {
    static ref K8S_QUERY: Regex =
        Regex::new(r"(?i)kubernetes\.deployment\.name[^)]*query:([^)]+)\)").unwrap();
    static ref K8S_MATCH_PHRASE: Regex =
        Regex::new(r"(?i)match_phrase.*kubernetes\.deployment\.name:([^)]+)\)").unwrap();
    static ref K8S_QUOTED: Regex =
        Regex::new(r#"kubernetes\.deployment\.name[^"]+"([^"]+)""#).unwrap();
    static ref K8S_TEXT: Regex =
        Regex::new(r"(?i)kubernetes\.deployment\.name[:\s]*([a-zA-Z0-9\-_.]+)").unwrap();
    static ref DEPLOYMENT_TEXT: Regex =
        Regex::new(r"(?i)deployment[:\s]*([a-zA-Z0-9\-_.]+)").unwrap();
    static ref JOB_TITLE_PREFIX: Regex = Regex::new(r"^(Project|Job)\s+").unwrap();
}

const FILTER_SELECTOR: &str = r#"[data-test-subj*="filter"]"#;
const BADGE_SELECTOR: &str = r#"[class*="filter"], [class*="badge"]"#;
const QUERY_INPUT_SELECTOR: &str = r#"[data-test-subj="queryInput"]"#;
const BREADCRUMB_LINKS: &str = ".breadcrumbs-container a";
const PROJECT_NAME_SELECTOR: &str = r#"[data-testid="project-name"]"#;
const JOB_HEADING_SELECTOR: &str = "#main-panel h1";
const JOB_BREADCRUMB_LINKS: &str = "#breadcrumbBar a";

/// A single extraction heuristic. A rule either yields a value or misses.
#[derive(Clone, Copy)]
pub enum Rule {
    /// Regex over the URL; capture 1 is percent-decoded and unquoted
    UrlPattern(&'static Regex),
    /// Regex over the percent-decoded URL
    DecodedUrlPattern(&'static Regex),
    /// First query parameter whose key contains any of the fragments
    QueryParam(&'static [&'static str]),
    /// Path segment immediately preceding a separator segment
    SegmentBefore(&'static str),
    /// Path segment at a fixed index
    SegmentAt(usize),
    /// Job name from the first `/job/{name}` of the path
    JobSegment,
    /// Regex over the text of every node matching the selector
    DomText {
        selector: &'static str,
        pattern: &'static Regex,
    },
    /// Regex over an input's value (or text when it has none)
    DomInput {
        selector: &'static str,
        pattern: &'static Regex,
    },
    /// Trimmed text of the first matching node, with a prefix pattern removed
    DomHeading {
        selector: &'static str,
        strip: Option<&'static Regex>,
    },
    /// Text of the first link whose href contains `require` but not `exclude`
    DomLink {
        selector: &'static str,
        require: &'static str,
        exclude: &'static str,
    },
    /// Text of the last link, when there are at least `min_links` links
    DomLastLink {
        selector: &'static str,
        min_links: usize,
    },
    /// App name declared in the job's config.xml pipeline script (network)
    JobConfig,
}

impl Rule {
    /// CSS selector the rule reads, if it reads the DOM.
    pub fn selector(&self) -> Option<&'static str> {
        match *self {
            Rule::DomText { selector, .. }
            | Rule::DomInput { selector, .. }
            | Rule::DomHeading { selector, .. }
            | Rule::DomLink { selector, .. }
            | Rule::DomLastLink { selector, .. } => Some(selector),
            _ => None,
        }
    }

    /// Evaluate every rule except `JobConfig`, which the chain runs itself.
    pub fn apply(&self, page: &PageContext, dom: Option<&dyn DomAccess>) -> Option<String> {
        let found = match *self {
            Rule::UrlPattern(re) => capture(re, page.as_str()).and_then(decode_unquote),
            Rule::DecodedUrlPattern(re) => {
                let decoded = urlencoding::decode(page.as_str()).ok()?;
                capture(re, &decoded).map(str::to_string)
            }
            Rule::QueryParam(keys) => page
                .url
                .query_pairs()
                .find(|(k, _)| keys.iter().any(|needle| k.contains(needle)))
                .map(|(_, v)| v.into_owned()),
            Rule::SegmentBefore(separator) => page
                .segments
                .iter()
                .position(|s| s == separator)
                .filter(|&idx| idx >= 1)
                .map(|idx| page.segments[idx - 1].clone()),
            Rule::SegmentAt(idx) => page.segments.get(idx).cloned(),
            Rule::JobSegment => ci::locate_job(&page.url).map(|loc| loc.job_name()),
            Rule::DomText { selector, pattern } => dom?
                .select(selector)
                .iter()
                .find_map(|node| capture(pattern, &node.text).map(str::to_string)),
            Rule::DomInput { selector, pattern } => {
                // First match only; an empty value falls back to the text
                let node = dom?.select(selector).into_iter().next()?;
                let text = node.value.as_deref().filter(|v| !v.is_empty()).unwrap_or(&node.text);
                capture(pattern, text).map(str::to_string)
            }
            Rule::DomHeading { selector, strip } => {
                let node = dom?.select(selector).into_iter().next()?;
                let text = node.text.trim();
                Some(match strip {
                    Some(re) => re.replace(text, "").into_owned(),
                    None => text.to_string(),
                })
            }
            Rule::DomLink {
                selector,
                require,
                exclude,
            } => dom?
                .select(selector)
                .into_iter()
                .find(|node| {
                    node.href
                        .as_deref()
                        .is_some_and(|href| !href.contains(exclude) && href.contains(require))
                })
                .map(|node| node.text),
            Rule::DomLastLink {
                selector,
                min_links,
            } => {
                let links = dom?.select(selector);
                if links.len() < min_links {
                    return None;
                }
                links.into_iter().last().map(|node| node.text)
            }
            Rule::JobConfig => None,
        };
        found
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn capture<'t>(re: &Regex, haystack: &'t str) -> Option<&'t str> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Percent-decode a captured value and drop any quote characters.
fn decode_unquote(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?;
    Some(decoded.replace(['\'', '"'], ""))
}

/// Rules that need live page access, in evaluation order.
pub fn primary_rules(platform: Platform) -> Vec<Rule> {
    match platform {
        Platform::LogSearch => vec![
            Rule::UrlPattern(&*K8S_QUERY),
            Rule::UrlPattern(&*K8S_MATCH_PHRASE),
            Rule::DomText {
                selector: FILTER_SELECTOR,
                pattern: &*K8S_TEXT,
            },
            Rule::DomText {
                selector: BADGE_SELECTOR,
                pattern: &*K8S_TEXT,
            },
            Rule::DomInput {
                selector: QUERY_INPUT_SELECTOR,
                pattern: &*K8S_TEXT,
            },
            Rule::DomText {
                selector: "body",
                pattern: &*DEPLOYMENT_TEXT,
            },
        ],
        Platform::SourceControl => vec![
            Rule::DomLink {
                selector: BREADCRUMB_LINKS,
                require: "/",
                exclude: "/groups/",
            },
            Rule::DomHeading {
                selector: PROJECT_NAME_SELECTOR,
                strip: None,
            },
        ],
        Platform::Ci => vec![
            Rule::JobConfig,
            Rule::DomHeading {
                selector: JOB_HEADING_SELECTOR,
                strip: Some(&*JOB_TITLE_PREFIX),
            },
            Rule::DomLastLink {
                selector: JOB_BREADCRUMB_LINKS,
                min_links: 2,
            },
        ],
        Platform::Unknown => Vec::new(),
    }
}

/// Rules that only read the URL, in evaluation order.
pub fn fallback_rules(platform: Platform) -> Vec<Rule> {
    match platform {
        Platform::LogSearch => vec![
            Rule::UrlPattern(&*K8S_QUERY),
            Rule::UrlPattern(&*K8S_MATCH_PHRASE),
            Rule::DecodedUrlPattern(&*K8S_QUOTED),
            Rule::QueryParam(&["deployment", "app"]),
        ],
        Platform::SourceControl => vec![Rule::SegmentBefore("-"), Rule::SegmentAt(1)],
        Platform::Ci => vec![Rule::JobSegment],
        Platform::Unknown => Vec::new(),
    }
}
