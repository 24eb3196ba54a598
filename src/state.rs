use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::analysis::{self, AnalysisReport};
use crate::app_logger::{ActivityEntry, ActivityLog};
use crate::config::{self, Settings};
use crate::extract::{DomAccess, DomSnapshot};
use crate::http;

/// The tab the sidebar is currently looking at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTab {
    #[serde(default)]
    pub tab_id: Option<i64>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom: Option<DomSnapshot>,
    /// Bumped on every tab event, so a fresh snapshot of the same URL is a change
    #[serde(default)]
    pub revision: u64,
}

/// Shared state for one host or CLI process.
pub struct AppState {
    config_dir: PathBuf,
    /// Swapped whole on save; passes hold their own `Arc`
    settings: RwLock<Arc<Settings>>,
    /// Rebuilt when the request timeout changes
    client: RwLock<reqwest::Client>,
    active_tab: Mutex<Option<ActiveTab>>,
    tab_revision: AtomicU64,
    activity: Mutex<ActivityLog>,
    /// Latest pass generation; older passes must not publish
    generation: AtomicU64,
}

impl AppState {
    /// State backed by the default config directory.
    pub fn load() -> Result<Self, String> {
        Self::with_config_dir(config::config_dir())
    }

    pub fn with_config_dir(config_dir: PathBuf) -> Result<Self, String> {
        let settings = config::load_settings_from(&config_dir);
        Self::with_settings(config_dir, settings)
    }

    pub fn with_settings(config_dir: PathBuf, settings: Settings) -> Result<Self, String> {
        let client = http::build_client(settings.request_timeout_secs)?;
        Ok(Self {
            config_dir,
            settings: RwLock::new(Arc::new(settings)),
            client: RwLock::new(client),
            active_tab: Mutex::new(None),
            tab_revision: AtomicU64::new(0),
            activity: Mutex::new(ActivityLog::default()),
            generation: AtomicU64::new(0),
        })
    }

    /// Immutable snapshot of the current settings.
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.read().clone()
    }

    pub fn client(&self) -> reqwest::Client {
        self.client.read().clone()
    }

    /// Validate, persist and publish new settings.
    ///
    /// Passes already running keep the snapshot they started with.
    pub fn save_settings(&self, settings: &Settings) -> Result<Arc<Settings>, String> {
        let saved = Arc::new(config::save_settings_to(&self.config_dir, settings)?);

        if saved.request_timeout_secs != self.settings.read().request_timeout_secs {
            *self.client.write() = http::build_client(saved.request_timeout_secs)?;
        }
        *self.settings.write() = saved.clone();
        tracing::info!("Settings saved to {}", self.config_dir.display());
        Ok(saved)
    }

    /// Replace the active tab. Returns the stored tab with its new revision.
    pub fn set_active_tab(&self, tab_id: Option<i64>, url: &str, dom: Option<DomSnapshot>) -> ActiveTab {
        let tab = ActiveTab {
            tab_id,
            url: url.to_string(),
            dom,
            revision: self.tab_revision.fetch_add(1, Ordering::SeqCst) + 1,
        };
        *self.active_tab.lock() = Some(tab.clone());
        tab
    }

    pub fn active_tab(&self) -> Option<ActiveTab> {
        self.active_tab.lock().clone()
    }

    /// Start a new pass, invalidating every pass started before it.
    pub fn begin_pass(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `generation` is still the most recent pass.
    pub fn is_latest(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn record_activity(&self, report: &AnalysisReport) {
        self.activity.lock().record(&report.url, &report.status);
    }

    pub fn activity(&self, limit: usize) -> Vec<ActivityEntry> {
        self.activity.lock().entries(limit)
    }

    pub fn clear_activity(&self) {
        self.activity.lock().clear();
    }

    /// Run one analysis pass against the current settings snapshot and
    /// record its status.
    pub async fn analyze(&self, url: &str, dom: Option<&dyn DomAccess>) -> AnalysisReport {
        let settings = self.settings();
        let client = self.client();
        let report = analysis::analyze(&client, &settings, url, dom).await;
        self.record_activity(&report);
        report
    }
}
