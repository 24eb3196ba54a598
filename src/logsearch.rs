//! Log-search (Kibana) links: the lookup service and the locally built fallback.

use crate::error_classification::LookupError;
use crate::http;

/// Field the deployment filter is applied to.
pub const DEPLOYMENT_FIELD: &str = "kubernetes.deployment.name";

/// Lookup request URL: `{service}?appName=&appProduct=&envID=`.
pub fn lookup_url(
    service_url: &str,
    identifier: &str,
    product: &str,
    environment: &str,
) -> Result<url::Url, LookupError> {
    let mut url = http::validate_url(service_url).map_err(LookupError::Config)?;
    url.query_pairs_mut()
        .append_pair("appName", identifier)
        .append_pair("appProduct", product)
        .append_pair("envID", environment);
    Ok(url)
}

/// Ask the log-search service for a ready-made URL.
///
/// The service answers with the URL as plain text. An empty body counts as a failure.
pub async fn fetch_log_search_url(
    client: &reqwest::Client,
    service_url: &str,
    identifier: &str,
    product: &str,
    environment: &str,
) -> Result<String, LookupError> {
    if service_url.is_empty() {
        return Err(LookupError::Config("log-search service URL is empty".to_string()));
    }
    let url = lookup_url(service_url, identifier, product, environment)?;

    let response = http::get_text(client, url.as_str())
        .await
        .map_err(LookupError::Transport)?;
    if !response.is_success() {
        return Err(LookupError::Transport(format!(
            "Log-search service returned HTTP {}",
            response.status
        )));
    }

    let target = response.body.trim();
    if target.is_empty() {
        return Err(LookupError::Transport(
            "Log-search service returned an empty URL".to_string(),
        ));
    }
    Ok(target.to_string())
}

/// Discover URL filtered to one deployment over the last hour.
pub fn discover_url(base_url: &str, identifier: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let filter = serde_json::json!({
        "$state": { "store": "appState" },
        "meta": {
            "alias": null,
            "disabled": false,
            "field": DEPLOYMENT_FIELD,
            "key": DEPLOYMENT_FIELD,
            "negate": false,
            "params": { "query": identifier },
            "type": "phrase",
        },
        "query": {
            "match_phrase": { DEPLOYMENT_FIELD: identifier },
        },
    });
    let encoded = urlencoding::encode(&filter.to_string()).into_owned();

    format!(
        "{base}/app/discover#/?_g=(filters:!(),refreshInterval:(pause:!t,value:0),time:(from:now-1h,to:now))\
         &_a=(columns:!(message),filters:!({encoded}),hideChart:!f,interval:auto,\
         query:(language:kuery,query:''),sort:!(!('@timestamp',desc)))"
    )
}
