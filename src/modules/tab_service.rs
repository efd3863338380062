//! Capabilities the panel consumes from its host: tab queries and commands,
//! change notifications, and the two user actions on a tab.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::TabError;
use crate::state::{Tab, TabId, WindowId};

/// Tab query/command capability of the host runtime.
#[async_trait]
pub trait TabService: Send + Sync {
    /// The focused window. Fails with [`TabError::NoWindow`] when there is none.
    async fn get_current_window_id(&self) -> Result<WindowId, TabError>;

    /// Tabs of `window_id` (the current window when `None`) in position order.
    ///
    /// When `override_active` is given the active flag is taken solely from it.
    /// Activation events arrive before the host's own active query settles.
    async fn get_tabs(
        &self,
        window_id: Option<WindowId>,
        override_active: Option<TabId>,
    ) -> Result<Vec<Tab>, TabError>;

    /// Activates the tab and focuses its window.
    async fn focus_tab(&self, tab_id: TabId) -> Result<(), TabError>;

    async fn close_tab(&self, tab_id: TabId) -> Result<(), TabError>;
}

/// User actions on a tab row.
#[async_trait]
pub trait TabActionHandler: Send + Sync {
    async fn on_tab_focus(&self, tab_id: TabId) -> Result<(), TabError>;
    async fn on_tab_close(&self, tab_id: TabId) -> Result<(), TabError>;
}

/// Forwards actions to a [`TabService`]. Errors are returned as-is, never retried.
pub struct ServiceActionHandler {
    service: Arc<dyn TabService>,
}

impl ServiceActionHandler {
    pub fn new(service: Arc<dyn TabService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl TabActionHandler for ServiceActionHandler {
    async fn on_tab_focus(&self, tab_id: TabId) -> Result<(), TabError> {
        self.service.focus_tab(tab_id).await
    }

    async fn on_tab_close(&self, tab_id: TabId) -> Result<(), TabError> {
        self.service.close_tab(tab_id).await
    }
}

/// Outbound channel to the browser that owns the real tabs.
pub trait HostCommandSink: Send + Sync {
    fn send(&self, action: TabAction) -> Result<(), TabError>;
}

/// Sends every action to the host first, then mirrors it locally so the
/// panel reflects it before the host's own notification comes back.
/// A failed send is returned and nothing is mirrored.
pub struct ForwardingActionHandler {
    host: Arc<dyn HostCommandSink>,
    local: Arc<dyn TabActionHandler>,
}

impl ForwardingActionHandler {
    pub fn new(host: Arc<dyn HostCommandSink>, local: Arc<dyn TabActionHandler>) -> Self {
        Self { host, local }
    }
}

#[async_trait]
impl TabActionHandler for ForwardingActionHandler {
    async fn on_tab_focus(&self, tab_id: TabId) -> Result<(), TabError> {
        self.host.send(TabAction::Focus(tab_id))?;
        self.local.on_tab_focus(tab_id).await
    }

    async fn on_tab_close(&self, tab_id: TabId) -> Result<(), TabError> {
        self.host.send(TabAction::Close(tab_id))?;
        self.local.on_tab_close(tab_id).await
    }
}

/// An action resolved from a pointer event on the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "tabId", rename_all = "camelCase")]
pub enum TabAction {
    Focus(TabId),
    Close(TabId),
}

impl TabAction {
    pub fn tab_id(&self) -> TabId {
        match self {
            TabAction::Focus(id) | TabAction::Close(id) => *id,
        }
    }

    pub async fn dispatch(self, handler: &dyn TabActionHandler) -> Result<(), TabError> {
        match self {
            TabAction::Focus(id) => handler.on_tab_focus(id).await,
            TabAction::Close(id) => handler.on_tab_close(id).await,
        }
    }
}

/// Change notifications raised by the host. Every one of them triggers a full refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostEvent {
    #[serde(rename_all = "camelCase")]
    TabCreated { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    TabUpdated { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    TabMoved { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    TabAttached { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    TabDetached { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    TabActivated { tab_id: TabId, window_id: WindowId },
    #[serde(rename_all = "camelCase")]
    WindowFocusChanged { window_id: Option<WindowId> },
}

impl HostEvent {
    /// Active tab to force on the refresh this event triggers.
    pub fn active_override(&self) -> Option<TabId> {
        match self {
            HostEvent::TabActivated { tab_id, .. } => Some(*tab_id),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call; optionally fails commands.
    #[derive(Default)]
    pub(crate) struct RecordingHandler {
        pub calls: Mutex<Vec<TabAction>>,
        pub fail: bool,
    }

    #[async_trait]
    impl TabActionHandler for RecordingHandler {
        async fn on_tab_focus(&self, tab_id: TabId) -> Result<(), TabError> {
            self.calls.lock().unwrap().push(TabAction::Focus(tab_id));
            if self.fail {
                return Err(TabError::TabNotFound(tab_id));
            }
            Ok(())
        }

        async fn on_tab_close(&self, tab_id: TabId) -> Result<(), TabError> {
            self.calls.lock().unwrap().push(TabAction::Close(tab_id));
            if self.fail {
                return Err(TabError::Host("denied".to_string()));
            }
            Ok(())
        }
    }

    /// Collects sent commands; optionally refuses them.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub sent: Mutex<Vec<TabAction>>,
        pub offline: bool,
    }

    impl HostCommandSink for RecordingHost {
        fn send(&self, action: TabAction) -> Result<(), TabError> {
            if self.offline {
                return Err(TabError::Host("host unreachable".to_string()));
            }
            self.sent.lock().unwrap().push(action);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forwarding_sends_then_mirrors() {
        let host = Arc::new(RecordingHost::default());
        let local = Arc::new(RecordingHandler::default());
        let handler = ForwardingActionHandler::new(host.clone(), local.clone());

        TabAction::Close(7).dispatch(&handler).await.unwrap();
        TabAction::Focus(8).dispatch(&handler).await.unwrap();

        assert_eq!(*host.sent.lock().unwrap(), vec![TabAction::Close(7), TabAction::Focus(8)]);
        assert_eq!(*local.calls.lock().unwrap(), vec![TabAction::Close(7), TabAction::Focus(8)]);
    }

    #[tokio::test]
    async fn test_forwarding_failure_skips_mirror() {
        let host = Arc::new(RecordingHost { offline: true, ..Default::default() });
        let local = Arc::new(RecordingHandler::default());
        let handler = ForwardingActionHandler::new(host, local.clone());

        let err = TabAction::Close(7).dispatch(&handler).await.unwrap_err();

        assert!(matches!(err, TabError::Host(_)));
        assert!(local.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_action_wire_format() {
        let json = serde_json::to_value(TabAction::Close(4)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "close", "tabId": 4}));
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_handler() {
        let handler = RecordingHandler::default();
        TabAction::Focus(3).dispatch(&handler).await.unwrap();
        TabAction::Close(4).dispatch(&handler).await.unwrap();

        assert_eq!(
            *handler.calls.lock().unwrap(),
            vec![TabAction::Focus(3), TabAction::Close(4)]
        );
    }

    #[tokio::test]
    async fn test_dispatch_propagates_error() {
        let handler = RecordingHandler {
            fail: true,
            ..Default::default()
        };
        let err = TabAction::Close(4).dispatch(&handler).await.unwrap_err();
        assert!(matches!(err, TabError::Host(_)));
        assert_eq!(handler.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_only_activation_overrides() {
        assert_eq!(
            HostEvent::TabActivated { tab_id: 3, window_id: 1 }.active_override(),
            Some(3)
        );
        assert_eq!(HostEvent::TabCreated { tab_id: 3 }.active_override(), None);
        assert_eq!(
            HostEvent::WindowFocusChanged { window_id: Some(1) }.active_override(),
            None
        );
    }

    #[test]
    fn test_event_wire_format() {
        let event: HostEvent =
            serde_json::from_str(r#"{"type": "tabActivated", "tabId": 5, "windowId": 2}"#).unwrap();
        assert_eq!(event, HostEvent::TabActivated { tab_id: 5, window_id: 2 });
    }
}
