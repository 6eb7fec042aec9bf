//! File access and native file dialogs for the viewer UI.

use std::io::Read;
use std::path::{Path, PathBuf};
use tauri_plugin_dialog::{DialogExt, FilePath};

use crate::error::{AppError, AppResult};
use crate::launch;

/// Bytes returned by `read_file_header` when the caller asks for zero or none.
pub(crate) const DEFAULT_HEADER_BYTES: usize = 10;

/// (filter name, extensions) for the open dialog, in display order.
const OPEN_FILTERS: &[(&str, &[&str])] = &[
    ("Email Files (*.msg, *.eml)", &["msg", "eml"]),
    ("MSG Files (*.msg)", &["msg"]),
    ("EML Files (*.eml)", &["eml"]),
    ("All Files (*.*)", &["*"]),
];

/// Read a whole file (shared logic)
pub(crate) fn read_file_bytes(path: &Path) -> AppResult<Vec<u8>> {
    let meta = std::fs::metadata(path).map_err(|e| AppError::from_read(path, e))?;
    if meta.is_dir() {
        return Err(AppError::NotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|e| AppError::from_read(path, e))
}

/// Read at most `bytes_to_read` leading bytes, clipped to the file size.
/// Zero, negative or missing lengths fall back to `DEFAULT_HEADER_BYTES`.
pub(crate) fn read_file_header_impl(path: &Path, bytes_to_read: Option<i64>) -> AppResult<Vec<u8>> {
    let wanted = bytes_to_read
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_HEADER_BYTES);

    let file = std::fs::File::open(path).map_err(|e| AppError::from_read(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| AppError::from_read(path, e))?
        .len();
    if size == 0 {
        return Ok(Vec::new());
    }

    let take = (wanted as u64).min(size);
    let mut header = Vec::with_capacity(take as usize);
    file.take(take)
        .read_to_end(&mut header)
        .map_err(|e| AppError::from_read(path, e))?;
    Ok(header)
}

/// Write `data` to `path`, creating parent directories as needed.
pub(crate) fn save_file_impl(path: &Path, data: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| AppError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, data).map_err(|e| AppError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn dialog_path(path: FilePath) -> AppResult<String> {
    path.into_path()
        .map(|p| launch::path_to_string(&p))
        .map_err(|e| AppError::Dialog {
            message: format!("Failed to convert selection to a path: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tauri::command]
pub(crate) fn read_file(path: String) -> AppResult<tauri::ipc::Response> {
    read_file_bytes(&PathBuf::from(path)).map(tauri::ipc::Response::new)
}

/// Same as `read_file`; the UI bridge calls both names.
#[tauri::command]
pub(crate) fn open_file(path: String) -> AppResult<tauri::ipc::Response> {
    read_file(path)
}

#[tauri::command]
pub(crate) fn read_file_header(
    path: String,
    bytes_to_read: Option<i64>,
) -> AppResult<tauri::ipc::Response> {
    read_file_header_impl(&PathBuf::from(path), bytes_to_read).map(tauri::ipc::Response::new)
}

#[tauri::command]
pub(crate) fn save_file(path: String, data: Vec<u8>) -> AppResult<()> {
    save_file_impl(&PathBuf::from(path), &data)
}

/// Pick one or more message files. Cancelling yields an empty list.
#[tauri::command]
pub(crate) async fn open_file_dialog(window: tauri::WebviewWindow) -> AppResult<Vec<String>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut builder = window
        .dialog()
        .file()
        .set_parent(&window)
        .set_title("Open Email File");
    for (name, extensions) in OPEN_FILTERS {
        builder = builder.add_filter(*name, extensions);
    }
    builder.pick_files(move |picked| {
        let _ = tx.send(picked);
    });

    let picked = rx.await.map_err(|e| AppError::Dialog {
        message: format!("Open dialog closed without a result: {e}"),
    })?;
    picked
        .unwrap_or_default()
        .into_iter()
        .map(dialog_path)
        .collect()
}

/// Ask where to save a file. Cancelling yields `None`.
#[tauri::command]
pub(crate) async fn save_file_dialog(
    window: tauri::WebviewWindow,
    default_filename: Option<String>,
) -> AppResult<Option<String>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut builder = window
        .dialog()
        .file()
        .set_parent(&window)
        .set_title("Save File");
    if let Some(name) = default_filename.filter(|n| !n.is_empty()) {
        builder = builder.set_file_name(name);
    }
    builder.save_file(move |picked| {
        let _ = tx.send(picked);
    });

    let picked = rx.await.map_err(|e| AppError::Dialog {
        message: format!("Save dialog closed without a result: {e}"),
    })?;
    picked.map(dialog_path).transpose()
}
