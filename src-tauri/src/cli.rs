//! System tool resolution with caching.
//!
//! Desktop-launched apps (Finder, Explorer, desktop launchers) don't inherit
//! the user's shell PATH, so tools like `update-mime-database` may not be
//! found by name. This module checks well-known directories and caches the
//! results for the lifetime of the app.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Well-known directories where system tools live but that desktop-launched
/// apps don't always have on PATH. Computed once and cached via OnceLock.
fn extra_bin_dirs() -> &'static [String] {
    static DIRS: OnceLock<Vec<String>> = OnceLock::new();
    DIRS.get_or_init(|| {
        let mut dirs = Vec::new();

        #[cfg(target_os = "linux")]
        {
            let home = std::env::var("HOME").unwrap_or_default();
            dirs.extend([
                "/usr/bin".to_string(),
                "/usr/local/bin".to_string(),
                "/bin".to_string(),
                format!("{home}/.local/bin"),
                "/run/current-system/sw/bin".to_string(),
            ]);
        }

        #[cfg(target_os = "macos")]
        {
            dirs.extend(["/usr/bin".to_string(), "/usr/local/bin".to_string()]);
        }

        #[cfg(target_os = "windows")]
        {
            let system_root =
                std::env::var("SystemRoot").unwrap_or_else(|_| "C:\\Windows".to_string());
            dirs.push(format!("{system_root}\\System32"));
        }

        dirs
    })
}

fn executable_name(name: &str) -> String {
    if cfg!(target_os = "windows") && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Resolve a tool to its full path, probing well-known directories.
///
/// Results are cached per name; falls back to the bare name so the OS
/// can still search PATH.
pub(crate) fn resolve_cli(name: &str) -> String {
    static CACHE: OnceLock<parking_lot::Mutex<HashMap<String, String>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| parking_lot::Mutex::new(HashMap::new()));

    {
        let guard = cache.lock();
        if let Some(cached) = guard.get(name) {
            return cached.clone();
        }
    }

    let resolved = resolve_cli_uncached(name);

    {
        let mut guard = cache.lock();
        guard.insert(name.to_string(), resolved.clone());
    }

    resolved
}

fn resolve_cli_uncached(name: &str) -> String {
    let file = executable_name(name);
    for dir in extra_bin_dirs() {
        let candidate = std::path::Path::new(dir).join(&file);
        if candidate.is_file() {
            return candidate.to_string_lossy().to_string();
        }
    }
    name.to_string()
}

/// Check if a tool exists on PATH or in well-known directories.
pub(crate) fn has_cli(name: &str) -> bool {
    if resolve_cli(name) != name {
        return true;
    }
    let checker = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };
    std::process::Command::new(checker)
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run a tool to completion. Non-zero exit is an error carrying stderr.
pub(crate) fn run_cli(name: &str, args: &[String]) -> Result<(), String> {
    let mut cmd = std::process::Command::new(resolve_cli(name));
    cmd.args(args);

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let output = cmd
        .output()
        .map_err(|e| format!("Failed to run {name}: {e}"))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(format!("{name} exited with {}: {stderr}", output.status))
    }
}
