//! Side panel composition root.
//!
//! Wires the tab source, the tree builder, the renderer and the action
//! handler, and re-runs fetch → build → render on every host notification.
//!
//! Refreshes may overlap (every host event may start one). Each refresh takes
//! a monotonically increasing token when it starts; once its fetch completes
//! it renders only if no newer refresh has rendered in the meantime, so the
//! view never steps back to an older snapshot of the tabs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::error::TabError;
use crate::modules::renderer::{PointerEvent, TabTreeRenderer};
use crate::modules::tab_service::{HostEvent, TabAction, TabActionHandler, TabService};
use crate::modules::tree_builder;
use crate::modules::view::{ElementId, ViewPatch};
use crate::state::{Tab, TabId};

/// Receives every batch of view patches, in render order.
pub trait PatchSink: Send + Sync {
    fn apply(&self, patches: Vec<ViewPatch>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Rendered { token: u64, patches: usize },
    /// A newer refresh already rendered; this one was dropped.
    Stale { token: u64 },
}

struct RenderSlot {
    renderer: TabTreeRenderer,
    /// Token of the refresh currently on screen.
    applied: u64,
}

pub struct TabTreePanel {
    service: Arc<dyn TabService>,
    actions: Arc<dyn TabActionHandler>,
    sink: Arc<dyn PatchSink>,
    slot: Mutex<RenderSlot>,
    issued: AtomicU64,
}

impl TabTreePanel {
    pub fn new(
        service: Arc<dyn TabService>,
        actions: Arc<dyn TabActionHandler>,
        sink: Arc<dyn PatchSink>,
        renderer: TabTreeRenderer,
    ) -> Self {
        Self {
            service,
            actions,
            sink,
            slot: Mutex::new(RenderSlot { renderer, applied: 0 }),
            issued: AtomicU64::new(0),
        }
    }

    /// Fetches the current window's tabs and renders them.
    ///
    /// On a fetch error nothing is rendered and the previous view stays.
    pub async fn refresh(&self, override_active: Option<TabId>) -> Result<RefreshOutcome, TabError> {
        let token = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        let tabs = match self.fetch(override_active).await {
            Ok(tabs) => tabs,
            Err(e) => {
                log::error!("[TabTree] Refresh #{} failed: {}", token, e);
                return Err(e);
            }
        };
        let forest = tree_builder::build(&tabs);

        let mut slot = self.slot.lock().await;
        if token < slot.applied {
            log::debug!(
                "[TabTree] Dropping refresh #{} (#{} already shown)",
                token,
                slot.applied
            );
            return Ok(RefreshOutcome::Stale { token });
        }
        slot.applied = token;
        let patches = slot.renderer.render(forest);
        let count = patches.len();
        if count > 0 {
            // Still under the lock so sinks see batches in render order
            self.sink.apply(patches);
        }
        Ok(RefreshOutcome::Rendered { token, patches: count })
    }

    async fn fetch(&self, override_active: Option<TabId>) -> Result<Vec<Tab>, TabError> {
        let window_id = self.service.get_current_window_id().await?;
        self.service.get_tabs(Some(window_id), override_active).await
    }

    /// Refreshes for a host notification. Failures are logged and swallowed:
    /// the next notification gets another chance.
    pub async fn handle_event(&self, event: HostEvent) {
        log::debug!("[TabTree] Host event {:?}", event);
        let _ = self.refresh(event.active_override()).await;
    }

    /// Processes host notifications until the sender goes away.
    pub async fn run(&self, mut events: broadcast::Receiver<HostEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle_event(event).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("[TabTree] Missed {} host events, refreshing", missed);
                    let _ = self.refresh(None).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    log::info!("[TabTree] Host event stream closed");
                    break;
                }
            }
        }
    }

    /// Resolves a click on the tree and performs the action. The action's
    /// error is returned to the caller unchanged.
    pub async fn on_pointer(&self, event: PointerEvent) -> Result<Option<TabAction>, TabError> {
        let action = self.slot.lock().await.renderer.resolve_pointer(event);
        let Some(action) = action else {
            return Ok(None);
        };
        log::debug!("[TabTree] {:?}", action);
        action.dispatch(self.actions.as_ref()).await?;
        Ok(Some(action))
    }

    pub async fn on_icon_error(&self, element: ElementId) {
        let mut slot = self.slot.lock().await;
        let patches = slot.renderer.icon_failed(element);
        if !patches.is_empty() {
            self.sink.apply(patches);
        }
    }

    /// Forgets the current view (a fresh webview attached) and renders from scratch.
    pub async fn reset(&self) -> Result<RefreshOutcome, TabError> {
        self.slot.lock().await.renderer.reset();
        self.refresh(None).await
    }
}
