use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::delivery::RetryPolicy;

/// Get the config directory using platform-appropriate location.
///
/// - macOS: `~/Library/Application Support/msgreader/`
/// - Linux: `~/.config/msgreader/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/msgreader/`
///
/// Falls back to `~/.msgreader/` if platform dir is unavailable.
pub(crate) fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("msgreader"))
        .unwrap_or_else(fallback_dotdir)
}

fn fallback_dotdir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".msgreader")
}

/// Load a JSON config file from the config dir, returning Default if missing or corrupt.
pub(crate) fn load_json_config<T: DeserializeOwned + Default>(filename: &str) -> T {
    load_json_config_from(&config_dir().join(filename))
}

/// Load a JSON config file at `path`.
/// Logs warnings/errors when the file exists but cannot be read or parsed,
/// so corrupt files are visible in logs instead of silently resetting state.
pub(crate) fn load_json_config_from<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Could not read config: {e}");
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(path = %path.display(), "Corrupt config: {e}. Using defaults.");
            T::default()
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryConfig
// ---------------------------------------------------------------------------

pub(crate) const SETTINGS_FILE: &str = "settings.json";

fn default_startup_followup_delay_ms() -> u64 {
    500
}

/// Tuning for how pending files are pushed into the UI. Read-only at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct DeliveryConfig {
    /// Delay before the rest of the startup batch follows the first file.
    pub startup_followup_delay_ms: u64,
    /// Polling policy for the injected script carrying the first file.
    pub first_retry: RetryPolicy,
    /// Polling policy for every other batch.
    pub subsequent_retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            startup_followup_delay_ms: default_startup_followup_delay_ms(),
            first_retry: RetryPolicy::FIRST,
            subsequent_retry: RetryPolicy::SUBSEQUENT,
        }
    }
}

impl DeliveryConfig {
    /// Clamp hand-edited values into a usable range.
    pub(crate) fn sanitized(mut self) -> Self {
        self.first_retry = self.first_retry.sanitized();
        self.subsequent_retry = self.subsequent_retry.sanitized();
        self
    }
}

pub(crate) fn load_delivery_config() -> DeliveryConfig {
    load_json_config::<DeliveryConfig>(SETTINGS_FILE).sanitized()
}
