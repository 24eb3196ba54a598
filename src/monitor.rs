//! Page monitor: poll the active tab and re-analyze when it changes.
//!
//! Passes can overlap when the tab changes faster than lookups finish. Each
//! pass carries a generation number and only the latest one may publish.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::analysis::{self, AnalysisReport};
use crate::extract::DomAccess;
use crate::state::{ActiveTab, AppState};

pub struct PageMonitor {
    state: Arc<AppState>,
    /// Revision of the tab the last pass was started for
    last_revision: Option<u64>,
}

impl PageMonitor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            last_revision: None,
        }
    }

    /// Check the active tab once and start a pass if it changed.
    pub fn poll(&mut self, reports: &mpsc::UnboundedSender<AnalysisReport>) -> Option<JoinHandle<bool>> {
        let tab = self.state.active_tab()?;
        if self.last_revision == Some(tab.revision) {
            return None;
        }
        self.last_revision = Some(tab.revision);

        let generation = self.state.begin_pass();
        tracing::debug!("Pass {generation} for {}", tab.url);
        Some(tokio::spawn(run_pass(
            self.state.clone(),
            generation,
            tab,
            reports.clone(),
        )))
    }

    /// Poll every `poll_interval_ms` until `shutdown` flips to true or the
    /// report receiver goes away.
    pub async fn run(
        mut self,
        reports: mpsc::UnboundedSender<AnalysisReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if reports.is_closed() {
                break;
            }
            self.poll(&reports);

            // Re-read each round so a settings save changes the cadence
            let interval = Duration::from_millis(self.state.settings().poll_interval_ms);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Page monitor stopped");
    }
}

/// Analyze `tab` and publish the report unless a newer pass has started.
/// Returns whether the report was published.
pub async fn run_pass(
    state: Arc<AppState>,
    generation: u64,
    tab: ActiveTab,
    reports: mpsc::UnboundedSender<AnalysisReport>,
) -> bool {
    let settings = state.settings();
    let client = state.client();
    let dom = tab.dom.as_ref().map(|d| d as &dyn DomAccess);
    let report = analysis::analyze(&client, &settings, &tab.url, dom).await;

    if !state.is_latest(generation) {
        tracing::debug!("Dropping stale pass {generation} for {}", tab.url);
        return false;
    }
    state.record_activity(&report);
    reports.send(report).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_config_dir(dir.path().to_path_buf()).unwrap();
        (dir, Arc::new(state))
    }

    #[tokio::test]
    async fn poll_starts_one_pass_per_tab_change() {
        let (_dir, state) = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = PageMonitor::new(state.clone());

        assert!(monitor.poll(&tx).is_none(), "no active tab yet");

        state.set_active_tab(Some(7), "https://news.example.com/", None);
        let handle = monitor.poll(&tx).expect("tab changed");
        assert!(handle.await.unwrap());
        let report = rx.recv().await.unwrap();
        assert_eq!(report.url, "https://news.example.com/");
        assert_eq!(report.status.message, "No project detected");

        assert!(monitor.poll(&tx).is_none(), "same revision");
        assert_eq!(state.activity(0).len(), 1);
    }

    #[tokio::test]
    async fn stale_pass_is_dropped() {
        let (_dir, state) = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tab = state.set_active_tab(None, "https://news.example.com/", None);

        let stale = state.begin_pass();
        let _latest = state.begin_pass();
        assert!(!run_pass(state.clone(), stale, tab, tx).await);
        assert!(rx.try_recv().is_err());
        assert!(state.activity(0).is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (_dir, state) = state();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(PageMonitor::new(state).run(tx, stop_rx));
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("monitor should stop")
            .unwrap();
    }
}
