// Tauri shell: hosts the side panel webview and bridges it to the tab tree.
//
// The webview owns the real DOM. It reports clicks and icon failures here and
// applies the patch batches emitted on "tab-tree-patch". The browser side
// pushes its tab state through `sync_tabs` or the per-change `tab_*`
// commands, and receives focus/close requests on "tab-command".

use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, State};

use crate::error::TabError;
use crate::modules::panel::{PatchSink, RefreshOutcome, TabTreePanel};
use crate::modules::registry::TabRegistry;
use crate::modules::renderer::{PointerEvent, TabTreeRenderer};
use crate::modules::tab_service::{
    ForwardingActionHandler, HostCommandSink, HostEvent, ServiceActionHandler, TabAction, TabService,
};
use crate::modules::view::{ElementId, ViewPatch};
use crate::settings::PanelSettings;
use crate::state::{HostSnapshot, HostTab, TabId, WindowId};

pub const PANEL_LABEL: &str = "sidepanel";
pub const PATCH_EVENT: &str = "tab-tree-patch";
pub const COMMAND_EVENT: &str = "tab-command";

pub struct PanelState {
    pub panel: Arc<TabTreePanel>,
    pub registry: Arc<TabRegistry>,
}

struct WebviewSink {
    app: AppHandle,
}

impl PatchSink for WebviewSink {
    fn apply(&self, patches: Vec<ViewPatch>) {
        if let Err(e) = self.app.emit_to(PANEL_LABEL, PATCH_EVENT, &patches) {
            log::error!("[TabTree] Failed to emit {} patches: {}", patches.len(), e);
        }
    }
}

/// Broadcasts tab commands to every webview; the host bridge listens for them.
struct WebviewCommandSink {
    app: AppHandle,
}

impl HostCommandSink for WebviewCommandSink {
    fn send(&self, action: TabAction) -> Result<(), TabError> {
        log::info!("[TabTree] Requesting {:?} from host", action);
        self.app
            .emit(COMMAND_EVENT, action)
            .map_err(|e| TabError::Host(e.to_string()))
    }
}

fn describe(outcome: RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::Rendered { patches, .. } => format!("rendered ({} patches)", patches),
        RefreshOutcome::Stale { .. } => "stale".to_string(),
    }
}

#[tauri::command]
async fn sync_tabs(state: State<'_, PanelState>, snapshot: HostSnapshot) -> Result<String, String> {
    state.registry.sync(snapshot).map_err(|e| e.to_string())?;
    let outcome = state.panel.refresh(None).await.map_err(|e| e.to_string())?;
    Ok(describe(outcome))
}

#[tauri::command]
async fn host_event(state: State<'_, PanelState>, event: HostEvent) -> Result<(), String> {
    state.panel.handle_event(event).await;
    Ok(())
}

#[tauri::command]
fn tab_created(state: State<'_, PanelState>, tab: HostTab) -> Result<(), String> {
    state.registry.insert_tab(tab).map_err(|e| e.to_string())
}

/// A close the panel already mirrored comes back here as an unknown tab.
#[tauri::command]
fn tab_removed(state: State<'_, PanelState>, tab_id: TabId) -> Result<(), String> {
    match state.registry.remove_tab(tab_id) {
        Ok(()) | Err(TabError::TabNotFound(_)) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

#[tauri::command]
fn tab_updated(
    state: State<'_, PanelState>,
    tab_id: TabId,
    title: Option<String>,
    url: Option<String>,
    fav_icon_url: Option<String>,
) -> Result<(), String> {
    state
        .registry
        .update_tab(tab_id, title.as_deref(), url.as_deref(), fav_icon_url.as_deref())
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn tab_moved(state: State<'_, PanelState>, tab_id: TabId, index: usize) -> Result<bool, String> {
    state.registry.move_tab(tab_id, index).map_err(|e| e.to_string())
}

#[tauri::command]
fn tabs_reordered(
    state: State<'_, PanelState>,
    window_id: WindowId,
    order: Vec<TabId>,
) -> Result<bool, String> {
    state
        .registry
        .reorder_window(window_id, &order)
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn tab_activated(state: State<'_, PanelState>, tab_id: TabId) -> Result<(), String> {
    state.registry.activate(tab_id).map_err(|e| e.to_string())
}

#[tauri::command]
fn window_focus_changed(state: State<'_, PanelState>, window_id: Option<WindowId>) -> Result<(), String> {
    state.registry.focus_window(window_id).map_err(|e| e.to_string())
}

#[tauri::command]
async fn tab_tree_pointer(
    state: State<'_, PanelState>,
    event: PointerEvent,
) -> Result<Option<TabAction>, String> {
    state.panel.on_pointer(event).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn tab_tree_icon_error(state: State<'_, PanelState>, element: ElementId) -> Result<(), String> {
    state.panel.on_icon_error(element).await;
    Ok(())
}

/// Called by the webview once its script has loaded. Replays the whole tree.
#[tauri::command]
async fn tab_tree_ready(state: State<'_, PanelState>) -> Result<String, String> {
    let outcome = state.panel.reset().await.map_err(|e| e.to_string())?;
    Ok(describe(outcome))
}

#[tauri::command]
fn open_side_panel(app: AppHandle, state: State<'_, PanelState>, window_id: Option<WindowId>) -> Result<(), String> {
    if let Some(id) = window_id {
        state.registry.focus_window(Some(id)).map_err(|e| e.to_string())?;
    }
    show_side_panel(&app);
    Ok(())
}

fn show_side_panel(app: &AppHandle) {
    if let Some(win) = app.get_webview_window(PANEL_LABEL) {
        let _ = win.show();
        let _ = win.set_focus();
        return;
    }

    let panel_window = tauri::WebviewWindowBuilder::new(
        app,
        PANEL_LABEL,
        tauri::WebviewUrl::App("index.html".into()),
    )
    .title("Tabs")
    .inner_size(320.0, 720.0)
    .resizable(true)
    .minimizable(false)
    .maximizable(false)
    .focused(true)
    .build();

    if let Err(e) = panel_window {
        log::error!("[TabTree] Failed to create side panel window: {:?}", e);
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            let handle = app.handle().clone();
            let settings = PanelSettings::get_path(&handle)
                .map(|path| PanelSettings::load(&path))
                .unwrap_or_default();

            handle.plugin(
                tauri_plugin_log::Builder::default()
                    .level(settings.level_filter())
                    .build(),
            )?;

            let registry = Arc::new(TabRegistry::new());
            let service: Arc<dyn TabService> = registry.clone();
            let actions = ForwardingActionHandler::new(
                Arc::new(WebviewCommandSink { app: handle.clone() }),
                Arc::new(ServiceActionHandler::new(service.clone())),
            );
            let panel = Arc::new(TabTreePanel::new(
                service,
                Arc::new(actions),
                Arc::new(WebviewSink { app: handle.clone() }),
                TabTreeRenderer::new(settings),
            ));

            let runner = panel.clone();
            let events = registry.subscribe();
            tauri::async_runtime::spawn(async move {
                runner.run(events).await;
            });

            app.manage(PanelState { panel, registry });
            show_side_panel(&handle);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            sync_tabs,
            host_event,
            tab_created,
            tab_removed,
            tab_updated,
            tab_moved,
            tabs_reordered,
            tab_activated,
            window_focus_changed,
            tab_tree_pointer,
            tab_tree_icon_error,
            tab_tree_ready,
            open_side_panel
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
