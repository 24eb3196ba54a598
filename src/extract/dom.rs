use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One element matched by a selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomNode {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Current value for form inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl DomNode {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn link(href: &str, text: &str) -> Self {
        Self {
            text: text.to_string(),
            href: Some(href.to_string()),
            value: None,
        }
    }
}

/// Read access to the live page, abstracted so rules run without a browser.
pub trait DomAccess: Send + Sync {
    /// Elements matching a CSS selector, in document order.
    fn select(&self, selector: &str) -> Vec<DomNode>;
}

/// Selector -> nodes map collected by the sidebar for the selectors we ask for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomSnapshot(pub HashMap<String, Vec<DomNode>>);

impl DomSnapshot {
    pub fn with(mut self, selector: &str, nodes: Vec<DomNode>) -> Self {
        self.0.insert(selector.to_string(), nodes);
        self
    }
}

impl DomAccess for DomSnapshot {
    fn select(&self, selector: &str) -> Vec<DomNode> {
        self.0.get(selector).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_deserializes_from_selector_map() {
        let json = r#"{
            ".breadcrumbs-container a": [
                {"text": "Group", "href": "/groups/grp"},
                {"text": "svc-foo", "href": "/grp/svc-foo"}
            ],
            "[data-test-subj=\"queryInput\"]": [{"value": "kubernetes.deployment.name: svc-foo"}]
        }"#;
        let snapshot: DomSnapshot = serde_json::from_str(json).unwrap();
        let links = snapshot.select(".breadcrumbs-container a");
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].href.as_deref(), Some("/grp/svc-foo"));
        let input = snapshot.select("[data-test-subj=\"queryInput\"]");
        assert_eq!(input[0].text, "");
        assert!(snapshot.select("body").is_empty());
    }
}
