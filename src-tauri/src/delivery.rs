//! Pushing opened files into the UI.
//!
//! Every batch travels over two channels at once: a structured Tauri event
//! and an injected script. Both feed the same in-page inbox, which drops
//! duplicates by `deliveryId`, so whichever arrives first wins and the other
//! is a no-op.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::launch;

pub(crate) const OPEN_FILE_EVENT: &str = "msgreader://open-file";
pub(crate) const DELIVERY_ACK_EVENT: &str = "msgreader://delivery-ack";

const SCRIPT_TEMPLATE: &str = include_str!("delivery.js");
const BATCH_PLACEHOLDER: &str = "__MSGREADER_BATCH__";
/// Wakes an inbox that stopped polling. A no-op when no batch was ever injected.
const RESUME_TEMPLATE: &str = "(function (retry) {\n  var inbox = window.__msgreaderInbox;\n  if (inbox && inbox.resume) {\n    inbox.resume(retry);\n  }\n})(__MSGREADER_RETRY__);";
const RETRY_PLACEHOLDER: &str = "__MSGREADER_RETRY__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum DeliveryPriority {
    /// The earliest file of the run; rendered as soon as it lands.
    First,
    Subsequent,
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff the injected script uses while it waits for
/// the UI surfaces to exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub(crate) const FIRST: RetryPolicy = RetryPolicy {
        initial_delay_ms: 50,
        max_delay_ms: 1_000,
        multiplier: 2.0,
        max_attempts: 40,
    };

    pub(crate) const SUBSEQUENT: RetryPolicy = RetryPolicy {
        initial_delay_ms: 200,
        max_delay_ms: 2_000,
        multiplier: 2.0,
        max_attempts: 30,
    };

    pub(crate) fn for_priority(
        priority: DeliveryPriority,
        first: RetryPolicy,
        subsequent: RetryPolicy,
    ) -> RetryPolicy {
        match priority {
            DeliveryPriority::First => first,
            DeliveryPriority::Subsequent => subsequent,
        }
    }

    /// Delay before poll number `attempt` (zero-based).
    ///
    /// Formula: min(initial_delay_ms * multiplier^attempt, max_delay_ms).
    /// Mirrors the computation in `delivery.js`.
    pub(crate) fn delay_for(&self, attempt: u32) -> u64 {
        // Cap before converting back to avoid overflow on large attempt counts
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
        raw.min(self.max_delay_ms as f64) as u64
    }

    /// Longest the script keeps polling before parking its queue.
    pub(crate) fn budget_ms(&self) -> u64 {
        (0..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }

    pub(crate) fn sanitized(mut self) -> Self {
        self.initial_delay_ms = self.initial_delay_ms.max(1);
        self.max_delay_ms = self.max_delay_ms.max(self.initial_delay_ms);
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            self.multiplier = 1.0;
        }
        self.max_attempts = self.max_attempts.max(1);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::SUBSEQUENT
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A single file as the UI receives it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeliveryPayload {
    pub delivery_id: u64,
    pub path: String,
    pub file_name: String,
    /// Lowercase, no dot.
    pub extension: String,
    pub byte_length: usize,
    pub data_base64: String,
    pub priority: DeliveryPriority,
    pub show_immediately: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeliveryBatch {
    pub items: Vec<DeliveryPayload>,
    pub retry: RetryPolicy,
}

/// Sent back by the in-page inbox once it has handled an item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeliveryAck {
    pub delivery_id: u64,
    /// `delivered`, `unsupported` or `failed`.
    pub status: String,
}

/// File contents loaded from disk, ready to become a payload.
#[derive(Debug, Clone)]
pub(crate) struct LoadedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl LoadedFile {
    pub(crate) fn into_payload(self, delivery_id: u64, priority: DeliveryPriority) -> DeliveryPayload {
        DeliveryPayload {
            delivery_id,
            path: launch::path_to_string(&self.path),
            file_name: self.file_name,
            extension: self.extension,
            byte_length: self.bytes.len(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(&self.bytes),
            priority,
            show_immediately: priority == DeliveryPriority::First,
        }
    }
}

/// Read a message file, rejecting extensions the UI cannot render.
pub(crate) fn load_file(path: &Path) -> AppResult<LoadedFile> {
    let extension = launch::lowercase_extension(path);
    if !launch::is_supported_message(path) {
        return Err(AppError::UnsupportedExtension { extension });
    }
    let bytes = std::fs::read(path).map_err(|e| AppError::from_read(path, e))?;
    Ok(LoadedFile {
        path: path.to_path_buf(),
        file_name: launch::display_name(path),
        extension,
        bytes,
    })
}

// ---------------------------------------------------------------------------
// UI surface
// ---------------------------------------------------------------------------

/// The parts of a webview window the dispatcher talks to.
pub(crate) trait UiSurface {
    fn label(&self) -> &str;
    fn emit_json(&self, event: &str, payload: &serde_json::Value) -> Result<(), String>;
    fn eval_script(&self, script: &str) -> Result<(), String>;
}

impl<R: tauri::Runtime> UiSurface for tauri::WebviewWindow<R> {
    fn label(&self) -> &str {
        tauri::WebviewWindow::label(self)
    }

    fn emit_json(&self, event: &str, payload: &serde_json::Value) -> Result<(), String> {
        use tauri::Emitter;
        let target = tauri::EventTarget::webview_window(tauri::WebviewWindow::label(self));
        self.emit_to(target, event, payload.clone())
            .map_err(|e| format!("Failed to emit {event}: {e}"))
    }

    fn eval_script(&self, script: &str) -> Result<(), String> {
        self.eval(script)
            .map_err(|e| format!("Failed to evaluate delivery script: {e}"))
    }
}

/// Build the injected script for `batch`.
pub(crate) fn render_delivery_script(batch: &DeliveryBatch) -> serde_json::Result<String> {
    // JSON is a JS expression except for these two line terminators
    let json = serde_json::to_string(batch)?
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029");
    Ok(SCRIPT_TEMPLATE.replace(BATCH_PLACEHOLDER, &json))
}

/// Build the script that restarts the inbox's polling with `retry`.
pub(crate) fn render_resume_script(retry: &RetryPolicy) -> serde_json::Result<String> {
    let json = serde_json::to_string(retry)?;
    Ok(RESUME_TEMPLATE.replace(RETRY_PLACEHOLDER, &json))
}

/// Ask the inbox to flush whatever it still holds, including files parked
/// after the retry budget ran out.
pub(crate) fn resume_inbox(surface: &dyn UiSurface, retry: &RetryPolicy) {
    let window = surface.label();
    match render_resume_script(retry) {
        Ok(script) => {
            if let Err(e) = surface.eval_script(&script) {
                tracing::warn!(window, "Inbox resume failed: {e}");
            }
        }
        Err(e) => tracing::error!(window, "Failed to render inbox resume script: {e}"),
    }
}

/// Send `batch` over both channels. Failures are logged, never returned:
/// each channel is independent of the other's outcome.
pub(crate) fn push_batch(surface: &dyn UiSurface, batch: &DeliveryBatch) {
    if batch.items.is_empty() {
        return;
    }
    let window = surface.label();
    let count = batch.items.len();

    match serde_json::to_value(batch) {
        Ok(value) => {
            if let Err(e) = surface.emit_json(OPEN_FILE_EVENT, &value) {
                tracing::warn!(window, count, "Event delivery failed: {e}");
            }
        }
        Err(e) => tracing::error!(window, count, "Failed to serialize delivery batch: {e}"),
    }

    match render_delivery_script(batch) {
        Ok(script) => {
            if let Err(e) = surface.eval_script(&script) {
                tracing::warn!(window, count, "Script delivery failed: {e}");
            }
        }
        Err(e) => tracing::error!(window, count, "Failed to render delivery script: {e}"),
    }

    tracing::info!(
        window,
        count,
        poll_budget_ms = batch.retry.budget_ms(),
        "Pushed files to UI"
    );
}
