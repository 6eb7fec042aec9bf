//! Tracing setup and the bridge for log lines coming from the UI.

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MSGREADER_LOG";
const DEFAULT_FILTER: &str = "msgreader_lib=info,msgreader=info";

fn filter_from(primary: Option<String>, fallback: Option<String>) -> EnvFilter {
    [primary, fallback]
        .into_iter()
        .flatten()
        .find_map(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub(crate) fn init_tracing() {
    let filter = filter_from(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UiLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub(crate) fn parse_level(level: &str) -> UiLevel {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => UiLevel::Error,
        "warn" | "warning" => UiLevel::Warn,
        "debug" => UiLevel::Debug,
        "trace" => UiLevel::Trace,
        _ => UiLevel::Info,
    }
}

/// Forward a UI log line into the native log.
#[tauri::command]
pub(crate) fn push_log(level: String, source: String, message: String) {
    match parse_level(&level) {
        UiLevel::Error => tracing::error!(target: "msgreader_lib::ui", %source, "{message}"),
        UiLevel::Warn => tracing::warn!(target: "msgreader_lib::ui", %source, "{message}"),
        UiLevel::Info => tracing::info!(target: "msgreader_lib::ui", %source, "{message}"),
        UiLevel::Debug => tracing::debug!(target: "msgreader_lib::ui", %source, "{message}"),
        UiLevel::Trace => tracing::trace!(target: "msgreader_lib::ui", %source, "{message}"),
    }
}
