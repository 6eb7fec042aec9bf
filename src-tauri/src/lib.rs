pub(crate) mod association;
pub(crate) mod cli;
pub(crate) mod config;
pub(crate) mod delivery;
pub(crate) mod dispatch;
pub(crate) mod error;
pub(crate) mod files;
pub(crate) mod launch;
pub(crate) mod logging;
pub(crate) mod state;

use std::path::PathBuf;
use std::sync::Arc;
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, Emitter, Listener, Manager, RunEvent, WindowEvent};

use delivery::UiSurface;
use dispatch::DispatchCoordinator;

pub(crate) const MAIN_WINDOW_LABEL: &str = "main";

/// UI → native: the page has its message surfaces in place.
const FRONTEND_READY_EVENT: &str = "msgreader://frontend-ready";
/// Native → UI: reply to `FRONTEND_READY_EVENT`.
const BACKEND_READY_EVENT: &str = "msgreader://backend-ready";

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn coordinator_of(app: &AppHandle) -> Arc<DispatchCoordinator> {
    app.state::<Arc<DispatchCoordinator>>().inner().clone()
}

/// Bring the existing window forward when a second instance is launched.
fn focus_main_window(app: &AppHandle) {
    if let Some(window) = app.get_webview_window(MAIN_WINDOW_LABEL) {
        let _ = window.unminimize();
        let _ = window.set_focus();
    }
}

/// Entry for files the OS hands us after launch.
fn open_runtime_paths(app: &AppHandle, paths: Vec<PathBuf>) {
    if paths.is_empty() {
        return;
    }
    let window = app.get_webview_window(MAIN_WINDOW_LABEL);
    let surface = window.as_ref().map(|w| w as &dyn UiSurface);
    let delivered = coordinator_of(app).accept_runtime_paths(paths, surface);
    tracing::debug!(delivered, "Runtime open handled");
}

/// Wire the readiness events and mark the process initialized.
fn setup_dispatch(app: &AppHandle) {
    let coordinator = coordinator_of(app);

    {
        let handle = app.clone();
        let coordinator = coordinator.clone();
        app.listen_any(FRONTEND_READY_EVENT, move |_event| {
            let Some(window) = handle.get_webview_window(MAIN_WINDOW_LABEL) else {
                coordinator.mark_ready();
                return;
            };
            let ack = coordinator.handshake(&window);
            tracing::info!(delivered = ack.delivered, "Frontend ready");
            let target = tauri::EventTarget::webview_window(MAIN_WINDOW_LABEL);
            if let Err(e) = window.emit_to(target, BACKEND_READY_EVENT, true) {
                tracing::warn!("Failed to emit {BACKEND_READY_EVENT}: {e}");
            }
        });
    }

    {
        let coordinator = coordinator.clone();
        app.listen_any(delivery::DELIVERY_ACK_EVENT, move |event| {
            coordinator.mark_ready();
            match serde_json::from_str::<delivery::DeliveryAck>(event.payload()) {
                Ok(ack) if ack.status == "delivered" => {
                    tracing::debug!(delivery_id = ack.delivery_id, "Delivery acknowledged");
                }
                Ok(ack) => tracing::warn!(
                    delivery_id = ack.delivery_id,
                    status = %ack.status,
                    "UI could not open delivered file"
                ),
                Err(e) => tracing::warn!("Malformed delivery ack: {e}"),
            }
        });
    }

    if app.get_webview_window(MAIN_WINDOW_LABEL).is_some() {
        coordinator.mark_initialized();
    } else {
        coordinator.begin_headless();
    }
}

/// The main page finished loading: push the first file now and the rest shortly after.
fn start_delivery(app: &AppHandle) {
    let Some(window) = app.get_webview_window(MAIN_WINDOW_LABEL) else {
        return;
    };
    let coordinator = coordinator_of(app);
    let remaining = coordinator.begin_startup(&window);
    if remaining > 0 {
        tracing::info!(
            remaining,
            delay_ms = coordinator.config().startup_followup_delay_ms,
            "Scheduling remaining startup files"
        );
        coordinator.schedule_followup(window);
    }
}

fn handle_run_event(app: &AppHandle, event: RunEvent) {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    if let RunEvent::Opened { urls } = event {
        let cwd = current_dir();
        let paths = urls
            .iter()
            .filter_map(|url| launch::resolve_opened_url(url, &cwd))
            .collect::<Vec<_>>();
        open_runtime_paths(app, paths);
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    let _ = (app, event);
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    logging::init_tracing();

    let config = config::load_delivery_config();
    let startup_paths = launch::resolve_launch_args(std::env::args().skip(1), &current_dir());
    let coordinator = Arc::new(DispatchCoordinator::new(config));
    coordinator.enqueue_startup(startup_paths);

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, args, cwd| {
            // argv[0] is the other instance's executable
            let paths = launch::resolve_launch_args(args.iter().skip(1), &PathBuf::from(cwd));
            open_runtime_paths(app, paths);
            focus_main_window(app);
        }))
        .plugin(tauri_plugin_dialog::init())
        .manage(coordinator)
        .setup(|app| {
            setup_dispatch(app.handle());
            Ok(())
        })
        .on_page_load(|webview, payload| {
            if webview.label() == MAIN_WINDOW_LABEL && matches!(payload.event(), PageLoadEvent::Finished) {
                start_delivery(webview.app_handle());
            }
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                coordinator_of(window.app_handle()).cancel_window(window.label());
            }
        })
        .invoke_handler(tauri::generate_handler![
            files::read_file,
            files::open_file,
            files::read_file_header,
            files::save_file,
            files::open_file_dialog,
            files::save_file_dialog,
            dispatch::get_pending_files,
            dispatch::is_initialized,
            dispatch::frontend_ready,
            dispatch::direct_open_file,
            association::register_file_associations,
            logging::push_log
        ])
        .build(tauri::generate_context!());

    match app {
        Ok(app) => app.run(handle_run_event),
        Err(e) => {
            tracing::error!("Error while building tauri application: {e}");
            std::process::exit(1);
        }
    }
}
