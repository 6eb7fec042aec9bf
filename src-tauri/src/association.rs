//! One-shot registration of msgReader as the handler for `.msg` and `.eml`.
//!
//! Windows gets per-user registry keys, Linux gets a desktop entry plus a
//! shared-mime-info package, macOS only gets instructions because Launch
//! Services reads the associations from the bundle's Info.plist.

use std::path::{Path, PathBuf};
use tauri::AppHandle;
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

use crate::error::{AppError, AppResult};
use crate::launch;

pub(crate) struct FileAssociation {
    pub extension: &'static str,
    pub prog_id: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
    pub mime_comment: &'static str,
}

pub(crate) const ASSOCIATIONS: &[FileAssociation] = &[
    FileAssociation {
        extension: "msg",
        prog_id: "msgReader.MSG",
        description: "MSG Email File",
        mime_type: "application/vnd.ms-outlook",
        mime_comment: "Microsoft Outlook Message",
    },
    FileAssociation {
        extension: "eml",
        prog_id: "msgReader.EML",
        description: "EML Email File",
        mime_type: "message/rfc822",
        mime_comment: "Email Message",
    },
];

pub(crate) const MACOS_INSTRUCTIONS: &str = "On macOS, file associations are handled by the system. \
Please right-click on a .msg or .eml file, select 'Get Info', change the 'Open with' option to \
msgReader, and click 'Change All'.";

const DESKTOP_FILE: &str = "msgreader.desktop";
const MIME_FILE: &str = "msgreader.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Parse a `std::env::consts::OS` identifier.
    pub(crate) fn parse(os: &str) -> AppResult<Self> {
        match os {
            "windows" => Ok(Platform::Windows),
            "macos" => Ok(Platform::MacOs),
            "linux" => Ok(Platform::Linux),
            other => Err(AppError::PlatformUnsupported {
                platform: other.to_string(),
            }),
        }
    }
}

/// Side effects registration needs from the outside world.
pub(crate) trait AssociationHost {
    fn executable(&self) -> Result<PathBuf, String>;
    /// XDG data home (`~/.local/share` on Linux).
    fn user_data_dir(&self) -> Option<PathBuf>;
    fn tool_available(&self, program: &str) -> bool;
    fn run_tool(&self, program: &str, args: &[String]) -> Result<(), String>;
    fn notify(&self, title: &str, message: &str);
}

fn step_error(step: impl Into<String>, detail: impl std::fmt::Display) -> AppError {
    AppError::RegistrationStep {
        step: step.into(),
        detail: detail.to_string(),
    }
}

/// Register associations for the platform named by `os`.
pub(crate) fn register(os: &str, host: &dyn AssociationHost) -> AppResult<bool> {
    let platform = Platform::parse(os)?;
    tracing::info!(?platform, "Registering file associations");
    match platform {
        Platform::Windows => register_windows(host),
        Platform::MacOs => {
            host.notify("File Associations", MACOS_INSTRUCTIONS);
            Ok(true)
        }
        Platform::Linux => register_linux(host),
    }
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

pub(crate) struct RegistryStep {
    pub name: String,
    pub args: Vec<String>,
}

fn reg_add_default(key: &str, value: &str) -> Vec<String> {
    ["add", key, "/ve", "/t", "REG_SZ", "/d", value, "/f"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// `reg add` invocations under `HKCU\Software\Classes`, in execution order.
pub(crate) fn windows_steps(exe: &Path) -> Vec<RegistryStep> {
    let open_command = format!("\"{}\" \"%1\"", exe.display());
    let mut steps = Vec::new();
    for assoc in ASSOCIATIONS {
        let ext = assoc.extension;
        let prog_key = format!("HKCU\\Software\\Classes\\{}", assoc.prog_id);
        steps.push(RegistryStep {
            name: format!("register .{ext} class"),
            args: reg_add_default(&format!("HKCU\\Software\\Classes\\.{ext}"), assoc.prog_id),
        });
        steps.push(RegistryStep {
            name: format!("create {} program entry", assoc.prog_id),
            args: reg_add_default(&prog_key, assoc.description),
        });
        steps.push(RegistryStep {
            name: format!("create {} open command", assoc.prog_id),
            args: reg_add_default(&format!("{prog_key}\\shell\\open\\command"), &open_command),
        });
    }
    steps
}

fn register_windows(host: &dyn AssociationHost) -> AppResult<bool> {
    let exe = host
        .executable()
        .map_err(|e| step_error("locate executable", e))?;
    for step in windows_steps(&exe) {
        host.run_tool("reg", &step.args)
            .map_err(|e| step_error(&step.name, e))?;
        tracing::debug!(step = %step.name, "Registry step done");
    }
    tracing::info!("File associations registered for the current user");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Linux
// ---------------------------------------------------------------------------

pub(crate) fn desktop_entry(exe: &Path) -> String {
    let mime_types: String = ASSOCIATIONS
        .iter()
        .map(|a| format!("{};", a.mime_type))
        .collect();
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name=msgReader\n\
         Exec={} %f\n\
         Icon=mail-message\n\
         MimeType={mime_types}\n\
         Categories=Office;Email;\n\
         Comment=MSG and EML file viewer\n\
         Terminal=false\n",
        exe.display()
    )
}

pub(crate) fn mime_package() -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <mime-info xmlns=\"http://www.freedesktop.org/standards/shared-mime-info\">\n",
    );
    for assoc in ASSOCIATIONS {
        xml.push_str(&format!(
            "  <mime-type type=\"{}\">\n    <comment>{}</comment>\n    <glob pattern=\"*.{}\"/>\n  </mime-type>\n",
            assoc.mime_type, assoc.mime_comment, assoc.extension
        ));
    }
    xml.push_str("</mime-info>\n");
    xml
}

fn write_step(step: &str, path: &Path, contents: &str) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| step_error(step, e))?;
    }
    std::fs::write(path, contents).map_err(|e| step_error(step, e))
}

/// Database refreshes are best effort: associations still apply at next login.
fn refresh(host: &dyn AssociationHost, program: &str, dir: &Path) {
    if !host.tool_available(program) {
        tracing::warn!(program, "Refresh tool not installed, skipping");
        return;
    }
    if let Err(e) = host.run_tool(program, &[launch::path_to_string(dir)]) {
        tracing::warn!(program, "Refresh failed: {e}");
    }
}

fn register_linux(host: &dyn AssociationHost) -> AppResult<bool> {
    let exe = host
        .executable()
        .map_err(|e| step_error("locate executable", e))?;
    let data_dir = host
        .user_data_dir()
        .ok_or_else(|| step_error("locate data directory", "no user data directory"))?;

    let applications = data_dir.join("applications");
    let desktop_path = applications.join(DESKTOP_FILE);
    write_step("write desktop entry", &desktop_path, &desktop_entry(&exe))?;
    tracing::info!(path = %desktop_path.display(), "Desktop entry written");
    refresh(host, "update-desktop-database", &applications);

    let mime_root = data_dir.join("mime");
    let mime_path = mime_root.join("packages").join(MIME_FILE);
    write_step("write mime package", &mime_path, &mime_package())?;
    tracing::info!(path = %mime_path.display(), "MIME package written");
    refresh(host, "update-mime-database", &mime_root);

    Ok(true)
}

// ---------------------------------------------------------------------------
// Tauri host
// ---------------------------------------------------------------------------

struct TauriHost {
    app: AppHandle,
}

impl AssociationHost for TauriHost {
    fn executable(&self) -> Result<PathBuf, String> {
        std::env::current_exe().map_err(|e| format!("Failed to get executable path: {e}"))
    }

    fn user_data_dir(&self) -> Option<PathBuf> {
        dirs::data_dir()
    }

    fn tool_available(&self, program: &str) -> bool {
        crate::cli::has_cli(program)
    }

    fn run_tool(&self, program: &str, args: &[String]) -> Result<(), String> {
        crate::cli::run_cli(program, args)
    }

    fn notify(&self, title: &str, message: &str) {
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Info)
            .show(|_| {});
    }
}

/// Blocks on subprocesses, so it runs off the main thread.
#[tauri::command]
pub(crate) async fn register_file_associations(app: AppHandle) -> AppResult<bool> {
    let host = TauriHost { app };
    tauri::async_runtime::spawn_blocking(move || register(std::env::consts::OS, &host))
        .await
        .map_err(|e| step_error("run registration", e))?
}
