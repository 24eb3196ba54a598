//! CI (Jenkins) job naming and the per-job `config.xml` probe.

use lazy_static::lazy_static;
use regex::Regex;

use crate::http;

/// Environment tokens recognized inside job identifiers.
const ENV_TOKENS: [&str; 5] = ["dev", "test", "prod", "staging", "qa"];

lazy_static! {
    static ref JOB_SEGMENT: Regex = Regex::new(r"/job/([^/]+)").unwrap();
    static ref SCRIPT_ELEMENT: Regex = Regex::new(r"(?s)<script(?:\s[^>]*)?>(.*?)</script>").unwrap();
    static ref DEF_APP_NAME: Regex = Regex::new(r#"def\s+_appName\s*=\s*['"]([^'"]+)['"]"#).unwrap();
    static ref APP_NAME: Regex = Regex::new(r#"appName\s*=\s*['"]([^'"]+)['"]"#).unwrap();
}

/// Derive the job identifier for an environment from the registry's base job id.
///
/// The first hyphen segment that is a known environment token is replaced;
/// otherwise the environment is inserted after the first segment, or appended
/// when the id has no hyphen.
pub fn environment_job_id(base_job_id: &str, environment: &str) -> String {
    let env = environment.trim().to_lowercase();
    let mut parts: Vec<&str> = base_job_id.split('-').collect();

    if let Some(idx) = parts
        .iter()
        .position(|p| ENV_TOKENS.iter().any(|t| p.eq_ignore_ascii_case(t)))
    {
        parts[idx] = &env;
        return parts.join("-");
    }

    if parts.len() > 1 {
        return format!("{}-{}-{}", parts[0], env, parts[1..].join("-"));
    }

    format!("{base_job_id}-{env}")
}

/// `{ci_base}/job/{job_id}/`
pub fn job_url(ci_base: &str, job_id: &str) -> String {
    format!("{}/job/{}/", ci_base.trim_end_matches('/'), job_id)
}

/// Location of a job inside a CI page URL.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLocation {
    /// Everything before the first `/job/` (scheme, host and any context path)
    pub base_url: String,
    /// Raw (still percent-encoded) job segment
    pub job_segment: String,
}

impl JobLocation {
    /// Percent-decoded job name, as shown in the CI UI.
    pub fn job_name(&self) -> String {
        urlencoding::decode(&self.job_segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| self.job_segment.clone())
    }

    pub fn config_xml_url(&self) -> String {
        format!("{}/job/{}/config.xml", self.base_url, self.job_segment)
    }
}

/// Find the first `/job/{name}` in a page URL.
pub fn locate_job(page_url: &url::Url) -> Option<JobLocation> {
    let path = page_url.path();
    let caps = JOB_SEGMENT.captures(path)?;
    let whole = caps.get(0)?;
    let job_segment = caps.get(1)?.as_str().to_string();

    let origin = page_url.origin().ascii_serialization();
    let base_url = format!("{origin}{}", &path[..whole.start()]);
    Some(JobLocation {
        base_url,
        job_segment,
    })
}

/// Undo the five predefined XML entity escapes (plus numeric references).
pub fn xml_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Text content of the first `<script>` element of a job's config.xml.
pub fn pipeline_script(config_xml: &str) -> Option<String> {
    let caps = SCRIPT_ELEMENT.captures(config_xml)?;
    let raw = caps.get(1)?.as_str();
    let raw = raw
        .trim()
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .map(str::to_string)
        .unwrap_or_else(|| xml_unescape(raw));
    if raw.trim().is_empty() { None } else { Some(raw) }
}

/// App name declared by a pipeline script (`def _appName = '...'`, then `appName = '...'`).
pub fn app_name_from_script(script: &str) -> Option<String> {
    [&*DEF_APP_NAME, &*APP_NAME].iter().find_map(|re| {
        re.captures(script)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Fetches a job's config.xml and reads the app name from its pipeline script.
#[derive(Clone)]
pub struct JobConfigProbe {
    client: reqwest::Client,
}

impl JobConfigProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// App name for the job shown at `page_url`. Every failure is a miss.
    pub async fn app_name(&self, page_url: &url::Url) -> Option<String> {
        let location = locate_job(page_url)?;
        let config_url = location.config_xml_url();

        let response = match http::get_text(&self.client, &config_url).await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Could not fetch {config_url}: {e}");
                return None;
            }
        };
        if !response.is_success() {
            tracing::debug!("{config_url} returned HTTP {}", response.status);
            return None;
        }

        let script = pipeline_script(&response.body)?;
        app_name_from_script(&script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_environment_token() {
        assert_eq!(environment_job_id("fwrk-dev-svc-foo", "DEV"), "fwrk-dev-svc-foo");
        assert_eq!(environment_job_id("fwrk-dev-svc-foo", "PROD"), "fwrk-prod-svc-foo");
        assert_eq!(environment_job_id("fwrk-QA-svc", "test"), "fwrk-test-svc");
    }

    #[test]
    fn only_first_token_is_replaced() {
        assert_eq!(environment_job_id("dev-svc-prod", "STAGING"), "staging-svc-prod");
    }

    #[test]
    fn token_must_be_whole_segment() {
        // "develop" is not the "dev" token
        assert_eq!(environment_job_id("svc-develop", "PROD"), "svc-prod-develop");
    }

    #[test]
    fn inserts_after_first_segment_when_no_token() {
        assert_eq!(environment_job_id("svc-bar", "STAGING"), "svc-staging-bar");
        assert_eq!(environment_job_id("team-svc-bar", "prod"), "team-prod-svc-bar");
    }

    #[test]
    fn appends_when_no_hyphen() {
        assert_eq!(environment_job_id("svcbar", "QA"), "svcbar-qa");
    }

    #[test]
    fn job_url_trims_trailing_slash() {
        assert_eq!(
            job_url("https://jenkins.example.com/", "fwrk-prod-svc-foo"),
            "https://jenkins.example.com/job/fwrk-prod-svc-foo/"
        );
    }

    #[test]
    fn locate_job_keeps_context_path() {
        let url = url::Url::parse("https://ci.example.com/jenkins/job/svc%20foo/42/console?x=1").unwrap();
        let location = locate_job(&url).unwrap();
        assert_eq!(location.base_url, "https://ci.example.com/jenkins");
        assert_eq!(location.job_segment, "svc%20foo");
        assert_eq!(location.job_name(), "svc foo");
        assert_eq!(
            location.config_xml_url(),
            "https://ci.example.com/jenkins/job/svc%20foo/config.xml"
        );
    }

    #[test]
    fn locate_job_without_job_segment() {
        let url = url::Url::parse("https://ci.example.com/view/all/").unwrap();
        assert_eq!(locate_job(&url), None);
    }

    #[test]
    fn xml_unescape_handles_entities() {
        assert_eq!(
            xml_unescape("def _appName = &apos;svc-foo&apos; &amp;&amp; x &lt; &#39;y&#x27; &bogus; &"),
            "def _appName = 'svc-foo' && x < 'y' &bogus; &"
        );
    }

    #[test]
    fn pipeline_script_reads_escaped_text() {
        let xml = r#"<?xml version='1.1' encoding='UTF-8'?>
<flow-definition plugin="workflow-job">
  <definition class="org.jenkinsci.plugins.workflow.cps.CpsFlowDefinition">
    <script>def _appName = &quot;svc-foo&quot;
pipeline { }</script>
    <sandbox>true</sandbox>
  </definition>
</flow-definition>"#;
        let script = pipeline_script(xml).unwrap();
        assert!(script.starts_with(r#"def _appName = "svc-foo""#));
        assert_eq!(app_name_from_script(&script).as_deref(), Some("svc-foo"));
    }

    #[test]
    fn pipeline_script_reads_cdata() {
        let xml = "<script><![CDATA[def _appName = 'svc-cdata']]></script>";
        assert_eq!(pipeline_script(xml).as_deref(), Some("def _appName = 'svc-cdata'"));
    }

    #[test]
    fn app_name_falls_back_to_plain_assignment() {
        assert_eq!(
            app_name_from_script("deploy(appName = 'svc-plain')").as_deref(),
            Some("svc-plain")
        );
        assert_eq!(app_name_from_script("pipeline { }"), None);
    }

    #[tokio::test]
    async fn probe_reads_app_name_from_config_xml() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/job/fwrk-dev-svc-foo/config.xml")
            .with_status(200)
            .with_body("<flow-definition><script>def _appName = &apos;svc-foo&apos;</script></flow-definition>")
            .create_async()
            .await;

        let probe = JobConfigProbe::new(http::build_client(5).unwrap());
        let page = url::Url::parse(&format!("{}/job/fwrk-dev-svc-foo/17/", server.url())).unwrap();
        assert_eq!(probe.app_name(&page).await.as_deref(), Some("svc-foo"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn probe_misses_on_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/job/svc/config.xml")
            .with_status(403)
            .create_async()
            .await;

        let probe = JobConfigProbe::new(http::build_client(5).unwrap());
        let page = url::Url::parse(&format!("{}/job/svc/", server.url())).unwrap();
        assert_eq!(probe.app_name(&page).await, None);
    }

    #[tokio::test]
    async fn probe_misses_on_timeout() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/job/slow/config.xml")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(std::time::Duration::from_secs(3));
                std::io::Write::write_all(w, b"<flow-definition><script>def _appName = 'svc-slow'</script></flow-definition>")
            })
            .create_async()
            .await;

        let probe = JobConfigProbe::new(http::build_client(1).unwrap());
        let page = url::Url::parse(&format!("{}/job/slow/", server.url())).unwrap();
        let started = std::time::Instant::now();
        assert_eq!(probe.app_name(&page).await, None);
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
    }
}
