use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::platform::Platform;

/// File holding the user settings inside the config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Environment variable that relocates the config directory (tests, portable installs).
pub const CONFIG_DIR_ENV: &str = "STACKSYNC_CONFIG_DIR";

/// Get the config directory using platform-appropriate location.
///
/// - macOS: `~/Library/Application Support/stacksync/`
/// - Linux: `~/.config/stacksync/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/stacksync/`
///
/// `STACKSYNC_CONFIG_DIR` wins over all of these when set and non-empty.
/// Falls back to `~/.stacksync/` if the platform dir is unavailable.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|d| d.join("stacksync"))
        .unwrap_or_else(legacy_dotdir)
}

/// Dotdir fallback: ~/.stacksync/
fn legacy_dotdir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stacksync")
}

/// Load a JSON config file, returning Default if missing or corrupt.
/// Logs warnings when the file exists but cannot be read or parsed,
/// so corrupt files are visible in logs instead of silently resetting state.
pub fn load_json_config<T: DeserializeOwned + Default>(dir: &Path, filename: &str) -> T {
    let path = dir.join(filename);
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Could not read config {}: {e}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Corrupt config {}: {e}. Using defaults.", path.display());
            T::default()
        }
    }
}

/// Save a JSON config file atomically (temp file + rename).
/// Sets 0600 permissions on Unix since endpoints may embed credentials.
pub fn save_json_config<T: Serialize>(dir: &Path, filename: &str, config: &T) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create config directory: {e}"))?;

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    let target = dir.join(filename);
    let temp = dir.join(format!("{}.tmp.{}", filename, std::process::id()));

    std::fs::write(&temp, &json)
        .map_err(|e| format!("Failed to write temp config: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp, perms)
            .map_err(|e| format!("Failed to set config permissions: {e}"))?;
    }

    // Either the old file or the new file exists, never a partial write
    std::fs::rename(&temp, &target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        format!("Failed to commit config: {e}")
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// EnvironmentConfig
// ---------------------------------------------------------------------------

/// A named deployment stage with its own endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Canonical upper-case name (e.g. "DEV")
    pub name: String,
    /// Log-search UI base URL for this environment (overrides the global one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_search_base_url: Option<String>,
    /// CI base URL for this environment (overrides the global one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_base_url: Option<String>,
}

impl EnvironmentConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: canonical_env_name(name),
            log_search_base_url: None,
            ci_base_url: None,
        }
    }
}

/// Environment names are keyed case-insensitively; upper-case is canonical.
pub fn canonical_env_name(name: &str) -> String {
    name.trim().to_uppercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Log-search UI (Kibana) base URL
    #[serde(default)]
    pub log_search_url: String,
    /// Source-control UI (GitLab) base URL
    #[serde(default)]
    pub source_control_url: String,
    /// CI UI (Jenkins) base URL
    #[serde(default)]
    pub ci_url: String,
    /// Optional regex normalizing extracted identifiers (group `name` or 1)
    #[serde(default)]
    pub naming_pattern: String,
    /// App registry (config service) base URL
    #[serde(default)]
    pub registry_url: String,
    /// Service answering log-search lookups with a ready-made URL
    #[serde(default)]
    pub log_search_service_url: String,
    /// Environment the operator currently works in
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_environments")]
    pub environments: Vec<EnvironmentConfig>,
    /// Active-tab poll interval for the page monitor
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Timeout applied to every outbound lookup
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_environment() -> String {
    "DEV".to_string()
}

fn default_environments() -> Vec<EnvironmentConfig> {
    vec![EnvironmentConfig::new(&default_environment())]
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_search_url: String::new(),
            source_control_url: String::new(),
            ci_url: String::new(),
            naming_pattern: String::new(),
            registry_url: String::new(),
            log_search_service_url: String::new(),
            environment: default_environment(),
            environments: default_environments(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Settings {
    /// Canonicalize a loaded or edited settings value.
    ///
    /// Names become upper-case, duplicate environments collapse to the first
    /// occurrence, blank optional URLs become `None`, and an empty environment
    /// list falls back to the single default environment.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.log_search_url,
            &mut self.source_control_url,
            &mut self.ci_url,
            &mut self.naming_pattern,
            &mut self.registry_url,
            &mut self.log_search_service_url,
        ] {
            *field = field.trim().to_string();
        }

        let mut environments: Vec<EnvironmentConfig> = Vec::with_capacity(self.environments.len());
        for env in self.environments {
            let name = canonical_env_name(&env.name);
            if name.is_empty() || environments.iter().any(|e| e.name == name) {
                continue;
            }
            environments.push(EnvironmentConfig {
                name,
                log_search_base_url: non_empty(env.log_search_base_url),
                ci_base_url: non_empty(env.ci_base_url),
            });
        }
        if environments.is_empty() {
            environments = default_environments();
        }
        self.environments = environments;

        self.environment = canonical_env_name(&self.environment);
        if self.environment.is_empty() {
            self.environment = default_environment();
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = default_poll_interval_ms();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self
    }

    /// Checks the settings editor enforces before anything is written.
    pub fn validate(&self) -> Result<(), String> {
        if self.environments.is_empty() {
            return Err("At least one environment is required".to_string());
        }
        if let Some(env) = self.environments.iter().find(|e| e.name.trim().is_empty()) {
            return Err(format!("Environment name must not be empty: {env:?}"));
        }
        if !self.naming_pattern.is_empty() {
            regex::Regex::new(&self.naming_pattern)
                .map_err(|e| format!("Invalid naming pattern: {e}"))?;
        }
        Ok(())
    }

    /// Configured UI base URL for a platform (empty when unset).
    pub fn base_url_for(&self, platform: Platform) -> &str {
        match platform {
            Platform::LogSearch => &self.log_search_url,
            Platform::SourceControl => &self.source_control_url,
            Platform::Ci => &self.ci_url,
            Platform::Unknown => "",
        }
    }

    pub fn is_current_environment(&self, name: &str) -> bool {
        canonical_env_name(name) == self.environment
    }

    /// Set a scalar setting by its camelCase key (CLI `settings set`).
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        match key {
            "logSearchUrl" => self.log_search_url = value.to_string(),
            "sourceControlUrl" => self.source_control_url = value.to_string(),
            "ciUrl" => self.ci_url = value.to_string(),
            "namingPattern" => self.naming_pattern = value.to_string(),
            "registryUrl" => self.registry_url = value.to_string(),
            "logSearchServiceUrl" => self.log_search_service_url = value.to_string(),
            "environment" => self.environment = canonical_env_name(value),
            "pollIntervalMs" => {
                self.poll_interval_ms = value
                    .parse()
                    .map_err(|e| format!("Invalid pollIntervalMs {value:?}: {e}"))?;
            }
            "requestTimeoutSecs" => {
                self.request_timeout_secs = value
                    .parse()
                    .map_err(|e| format!("Invalid requestTimeoutSecs {value:?}: {e}"))?;
            }
            other => return Err(format!("Unknown setting: {other}")),
        }
        Ok(())
    }

    /// Add an environment, or replace the one with the same name in place.
    pub fn upsert_environment(&mut self, env: EnvironmentConfig) {
        let env = EnvironmentConfig {
            name: canonical_env_name(&env.name),
            log_search_base_url: non_empty(env.log_search_base_url),
            ci_base_url: non_empty(env.ci_base_url),
        };
        match self.environments.iter_mut().find(|e| e.name == env.name) {
            Some(existing) => *existing = env,
            None => self.environments.push(env),
        }
    }

    /// Remove an environment. The last remaining environment cannot be removed.
    pub fn remove_environment(&mut self, name: &str) -> Result<(), String> {
        let name = canonical_env_name(name);
        let Some(idx) = self.environments.iter().position(|e| e.name == name) else {
            return Err(format!("No environment named {name}"));
        };
        if self.environments.len() == 1 {
            return Err("At least one environment is required".to_string());
        }
        self.environments.remove(idx);
        Ok(())
    }
}

pub fn load_settings_from(dir: &Path) -> Settings {
    load_json_config::<Settings>(dir, SETTINGS_FILE).normalized()
}

/// Validate and persist settings, returning the canonical form that was written.
pub fn save_settings_to(dir: &Path, settings: &Settings) -> Result<Settings, String> {
    settings.validate()?;
    let canonical = settings.clone().normalized();
    save_json_config(dir, SETTINGS_FILE, &canonical)?;
    Ok(canonical)
}
