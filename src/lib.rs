pub mod analysis;
pub mod app_logger;
pub mod ci;
pub mod config;
pub mod correlate;
pub mod error_classification;
pub mod extract;
pub mod host;
pub mod http;
pub mod logsearch;
pub mod monitor;
pub mod page;
pub mod platform;
pub mod registry;
pub mod scm;
pub mod state;

// Re-export the types most callers need
pub use analysis::AnalysisReport;
pub use config::Settings;
pub use platform::Platform;
pub use state::AppState;
