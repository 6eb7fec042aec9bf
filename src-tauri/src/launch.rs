//! Launch argument and open-event path resolution.
//!
//! The OS hands us raw strings: process arguments on launch, relaunch
//! arguments through the single-instance plugin, and `file://` URLs from
//! macOS open events. Everything that is not an existing regular file is
//! dropped here so the rest of the app only ever sees absolute file paths.

use std::path::{Path, PathBuf};

/// Extensions the UI knows how to render, lowercase and without the dot.
pub(crate) const SUPPORTED_EXTENSIONS: &[&str] = &["msg", "eml"];

/// An argument prefix the OS injects into our argv on its own behalf.
struct InjectedFlag {
    prefix: &'static str,
    /// Whether the flag is followed by a separate value token.
    takes_value: bool,
}

/// `-NS*` and `-Apple*` are Cocoa user-default overrides (`-NSDocumentRevisionsDebugMode YES`).
/// `-psn_0_12345` is the legacy Finder process serial number with the value embedded.
const INJECTED_FLAGS: &[InjectedFlag] = &[
    InjectedFlag { prefix: "-NS", takes_value: true },
    InjectedFlag { prefix: "-Apple", takes_value: true },
    InjectedFlag { prefix: "-psn_", takes_value: false },
];

fn injected_flag(token: &str) -> Option<&'static InjectedFlag> {
    INJECTED_FLAGS.iter().find(|f| token.starts_with(f.prefix))
}

/// Resolve launch arguments (without argv[0]) into absolute file paths.
///
/// Order is preserved. Directories, missing files and OS-injected flags are
/// skipped without error.
pub(crate) fn resolve_launch_args<I, S>(args: I, cwd: &Path) -> Vec<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut resolved = Vec::new();
    let mut skip_value = false;

    for arg in args {
        let token = arg.as_ref();

        if skip_value {
            skip_value = false;
            if !token.starts_with('-') {
                tracing::debug!(token, "Skipping value of injected launch flag");
                continue;
            }
        }

        if let Some(flag) = injected_flag(token) {
            tracing::debug!(token, "Skipping OS-injected launch flag");
            skip_value = flag.takes_value;
            continue;
        }

        match resolve_open_path(token, cwd) {
            Some(path) => resolved.push(path),
            None => tracing::debug!(token, "Ignoring launch argument that is not a file"),
        }
    }

    resolved
}

/// Resolve a single raw path to an absolute path of an existing regular file.
///
/// A relative token is tried against `cwd` first, since that is the
/// directory of the process that received it. Only then is it stat'ed as
/// given, against this process's own working directory.
pub(crate) fn resolve_open_path(raw: &str, cwd: &Path) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    let direct = Path::new(raw);
    let candidates = if direct.is_absolute() {
        vec![direct.to_path_buf()]
    } else {
        vec![cwd.join(direct), direct.to_path_buf()]
    };
    candidates
        .into_iter()
        .find(|candidate| is_regular_file(candidate))
        .and_then(|found| std::path::absolute(found).ok())
}

/// Resolve a URL from an OS open event. Only `file://` URLs are accepted.
pub(crate) fn resolve_opened_url(url: &url::Url, cwd: &Path) -> Option<PathBuf> {
    if url.scheme() != "file" {
        tracing::debug!(%url, "Ignoring non-file open URL");
        return None;
    }
    let path = url.to_file_path().ok()?;
    resolve_open_path(&path.to_string_lossy(), cwd)
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| !m.is_dir()).unwrap_or(false)
}

pub(crate) fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Base file name for display, falling back to the full path.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_to_string(path))
}

/// Lowercase extension without the dot, empty when there is none.
pub(crate) fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

pub(crate) fn is_supported_message(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&lowercase_extension(path).as_str())
}
