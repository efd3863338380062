// In-process tab model - the shell's own view of the host's tabs.
// Implements the tab source the panel queries and broadcasts a HostEvent for every change.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::error::TabError;
use crate::modules::tab_service::{HostEvent, TabService};
use crate::state::{HostSnapshot, HostTab, Tab, TabId, WindowId};

const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct RegistryState {
    tabs: Vec<HostTab>,
    active: HashMap<WindowId, TabId>,
    focused_window: Option<WindowId>,
    next_id: TabId,
}

impl RegistryState {
    fn window_of(&self, tab_id: TabId) -> Option<WindowId> {
        self.tabs.iter().find(|t| t.id == tab_id).map(|t| t.window_id)
    }

    /// Tabs of one window, in position order.
    fn window_tabs(&self, window_id: WindowId) -> Vec<&HostTab> {
        let mut tabs: Vec<&HostTab> = self.tabs.iter().filter(|t| t.window_id == window_id).collect();
        tabs.sort_by_key(|t| t.index.unwrap_or(0));
        tabs
    }

    fn window_order(&self, window_id: WindowId) -> Vec<TabId> {
        self.window_tabs(window_id).iter().map(|t| t.id).collect()
    }

    /// Rewrites tab positions to match `order`.
    fn apply_order(&mut self, order: &[TabId]) {
        for (index, id) in order.iter().enumerate() {
            if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == *id) {
                tab.index = Some(index);
            }
        }
    }
}

/// Pure logic for reordering a window's tabs.
/// Returns the resulting order and whether it differs from `current`.
///
/// Algorithm:
/// 1. Rebuild the order from `new_order`, skipping ids not in the window
/// 2. Append any tabs that weren't in `new_order` (prevents losing tabs on races)
fn reorder_logic(current: &[TabId], new_order: &[TabId]) -> (Vec<TabId>, bool) {
    if current.is_empty() || new_order.is_empty() {
        return (current.to_vec(), false);
    }

    let mut remaining: Vec<TabId> = current.to_vec();
    let mut reordered = Vec::with_capacity(current.len());
    for id in new_order {
        if let Some(pos) = remaining.iter().position(|t| t == id) {
            reordered.push(remaining.remove(pos));
        }
    }
    reordered.extend(remaining);

    let changed = reordered != current;
    (reordered, changed)
}

pub struct TabRegistry {
    state: Mutex<RegistryState>,
    events: broadcast::Sender<HostEvent>,
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TabRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                ..RegistryState::default()
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>, TabError> {
        self.state.lock().map_err(|e| TabError::Host(e.to_string()))
    }

    fn emit(&self, event: HostEvent) {
        log::debug!("[TabRegistry] {:?}", event);
        // No subscribers is fine: nobody is showing the panel yet
        let _ = self.events.send(event);
    }

    /// Replaces the whole model with what the host reports. Emits no event;
    /// the caller decides whether to refresh.
    pub fn sync(&self, snapshot: HostSnapshot) -> Result<(), TabError> {
        let mut state = self.lock()?;
        state.active = snapshot
            .active_tab_ids
            .iter()
            .filter_map(|&id| snapshot.tabs.iter().find(|t| t.id == id).map(|t| (t.window_id, id)))
            .collect();
        state.focused_window = snapshot.focused_window_id;
        state.next_id = snapshot
            .tabs
            .iter()
            .map(|t| t.id + 1)
            .max()
            .unwrap_or(1)
            .max(state.next_id);
        state.tabs = snapshot.tabs;
        log::info!("[TabRegistry] Synced {} tabs", state.tabs.len());
        Ok(())
    }

    /// Adds a tab the host just created, at its reported position (appended
    /// when none). A known id is replaced. The first tab of a window becomes
    /// its active one, and the first window to get a tab becomes focused.
    pub fn insert_tab(&self, tab: HostTab) -> Result<(), TabError> {
        let tab_id = tab.id;
        {
            let mut state = self.lock()?;
            state.tabs.retain(|t| t.id != tab_id);
            let window_id = tab.window_id;
            let mut order = state.window_order(window_id);
            let index = tab.index.unwrap_or(order.len()).min(order.len());
            order.insert(index, tab_id);

            state.tabs.push(tab);
            state.apply_order(&order);
            state.next_id = state.next_id.max(tab_id + 1);
            state.active.entry(window_id).or_insert(tab_id);
            state.focused_window.get_or_insert(window_id);
        }
        self.emit(HostEvent::TabCreated { tab_id });
        Ok(())
    }

    /// Opens a tab with a fresh id at the end of `window_id`.
    #[cfg(test)]
    pub(crate) fn open_tab(
        &self,
        window_id: WindowId,
        title: &str,
        url: &str,
        opener_tab_id: Option<TabId>,
    ) -> Result<TabId, TabError> {
        let id = self.lock()?.next_id;
        self.insert_tab(HostTab {
            id,
            window_id,
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            fav_icon_url: None,
            opener_tab_id,
            index: None,
        })?;
        Ok(id)
    }

    pub fn remove_tab(&self, tab_id: TabId) -> Result<(), TabError> {
        {
            let mut state = self.lock()?;
            let window_id = state.window_of(tab_id).ok_or(TabError::TabNotFound(tab_id))?;
            let order: Vec<TabId> = state
                .window_order(window_id)
                .into_iter()
                .filter(|&id| id != tab_id)
                .collect();
            state.tabs.retain(|t| t.id != tab_id);
            state.apply_order(&order);
            if state.active.get(&window_id) == Some(&tab_id) {
                match order.first() {
                    Some(&next) => state.active.insert(window_id, next),
                    None => state.active.remove(&window_id),
                };
            }
        }
        self.emit(HostEvent::TabRemoved { tab_id });
        Ok(())
    }

    pub fn update_tab(
        &self,
        tab_id: TabId,
        title: Option<&str>,
        url: Option<&str>,
        fav_icon_url: Option<&str>,
    ) -> Result<(), TabError> {
        {
            let mut state = self.lock()?;
            let tab = state
                .tabs
                .iter_mut()
                .find(|t| t.id == tab_id)
                .ok_or(TabError::TabNotFound(tab_id))?;
            if let Some(title) = title {
                tab.title = Some(title.to_string());
            }
            if let Some(url) = url {
                tab.url = Some(url.to_string());
            }
            if let Some(icon) = fav_icon_url {
                tab.fav_icon_url = Some(icon.to_string()).filter(|i| !i.is_empty());
            }
        }
        self.emit(HostEvent::TabUpdated { tab_id });
        Ok(())
    }

    /// Reorders a window's tabs. Returns true if the order changed.
    pub fn reorder_window(&self, window_id: WindowId, new_order: &[TabId]) -> Result<bool, TabError> {
        let moved = {
            let mut state = self.lock()?;
            let current = state.window_order(window_id);
            log::debug!("[TabRegistry] Reorder {:?} -> {:?}", current, new_order);
            let (order, changed) = reorder_logic(&current, new_order);
            if !changed {
                return Ok(false);
            }
            state.apply_order(&order);
            order
                .iter()
                .zip(current.iter())
                .filter(|(new, old)| new != old)
                .map(|(new, _)| *new)
                .collect::<Vec<_>>()
        };
        for tab_id in moved {
            self.emit(HostEvent::TabMoved { tab_id });
        }
        Ok(true)
    }

    /// Moves a tab to `index` within its window.
    pub fn move_tab(&self, tab_id: TabId, index: usize) -> Result<bool, TabError> {
        let (window_id, order) = {
            let state = self.lock()?;
            let window_id = state.window_of(tab_id).ok_or(TabError::TabNotFound(tab_id))?;
            let mut order: Vec<TabId> = state
                .window_order(window_id)
                .into_iter()
                .filter(|&id| id != tab_id)
                .collect();
            order.insert(index.min(order.len()), tab_id);
            (window_id, order)
        };
        self.reorder_window(window_id, &order)
    }

    /// Marks a tab active in its window without touching window focus.
    pub fn activate(&self, tab_id: TabId) -> Result<(), TabError> {
        let window_id = {
            let mut state = self.lock()?;
            let window_id = state.window_of(tab_id).ok_or(TabError::TabNotFound(tab_id))?;
            state.active.insert(window_id, tab_id);
            window_id
        };
        self.emit(HostEvent::TabActivated { tab_id, window_id });
        Ok(())
    }

    /// `None` means focus left every window.
    pub fn focus_window(&self, window_id: Option<WindowId>) -> Result<(), TabError> {
        {
            let mut state = self.lock()?;
            if let Some(id) = window_id {
                if !state.tabs.iter().any(|t| t.window_id == id) {
                    return Err(TabError::WindowNotFound(id));
                }
            }
            state.focused_window = window_id;
        }
        self.emit(HostEvent::WindowFocusChanged { window_id });
        Ok(())
    }
}

#[async_trait]
impl TabService for TabRegistry {
    async fn get_current_window_id(&self) -> Result<WindowId, TabError> {
        self.lock()?.focused_window.ok_or(TabError::NoWindow)
    }

    async fn get_tabs(
        &self,
        window_id: Option<WindowId>,
        override_active: Option<TabId>,
    ) -> Result<Vec<Tab>, TabError> {
        let state = self.lock()?;
        let window_id = match window_id {
            Some(id) => id,
            None => state.focused_window.ok_or(TabError::NoWindow)?,
        };
        let active = override_active.or_else(|| state.active.get(&window_id).copied());
        Ok(state
            .window_tabs(window_id)
            .into_iter()
            .map(|t| t.to_tab(active))
            .collect())
    }

    async fn focus_tab(&self, tab_id: TabId) -> Result<(), TabError> {
        let window_id = {
            let state = self.lock()?;
            state.window_of(tab_id).ok_or(TabError::TabNotFound(tab_id))?
        };
        self.activate(tab_id)?;
        let focused = self.lock()?.focused_window;
        if focused != Some(window_id) {
            self.focus_window(Some(window_id))?;
        }
        Ok(())
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), TabError> {
        self.remove_tab(tab_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn registry_with(window_id: WindowId, count: usize) -> (TabRegistry, Vec<TabId>) {
        let registry = TabRegistry::new();
        let ids = (0..count)
            .map(|i| {
                registry
                    .open_tab(window_id, &format!("Tab {}", i), "https://example.com", None)
                    .unwrap()
            })
            .collect();
        (registry, ids)
    }

    fn order(registry: &TabRegistry, window_id: WindowId) -> Vec<TabId> {
        registry.lock().unwrap().window_order(window_id)
    }

    #[rstest]
    #[case::reorder(vec![1, 2, 3], vec![3, 1, 2], vec![3, 1, 2], true)]
    #[case::missing_id_appended(vec![1, 2, 3], vec![3, 1], vec![3, 1, 2], true)]
    #[case::unknown_id_ignored(vec![1, 2], vec![9, 2, 1], vec![2, 1], true)]
    #[case::no_change(vec![1, 2], vec![1, 2], vec![1, 2], false)]
    #[case::empty_new_order(vec![1], vec![], vec![1], false)]
    fn test_reorder_logic(
        #[case] current: Vec<TabId>,
        #[case] new_order: Vec<TabId>,
        #[case] expected: Vec<TabId>,
        #[case] changed: bool,
    ) {
        assert_eq!(reorder_logic(&current, &new_order), (expected, changed));
    }

    #[tokio::test]
    async fn test_get_tabs_in_position_order() {
        let (registry, ids) = registry_with(1, 3);
        registry.move_tab(ids[2], 0).unwrap();

        let tabs = registry.get_tabs(None, None).await.unwrap();
        let got: Vec<(TabId, usize)> = tabs.iter().map(|t| (t.id, t.index)).collect();
        assert_eq!(got, vec![(ids[2], 0), (ids[0], 1), (ids[1], 2)]);
        // First opened tab stays active
        assert!(tabs.iter().find(|t| t.id == ids[0]).unwrap().active);
    }

    #[tokio::test]
    async fn test_override_wins_over_host_active() {
        let (registry, ids) = registry_with(1, 3);

        let tabs = registry.get_tabs(Some(1), Some(ids[2])).await.unwrap();
        let active: Vec<TabId> = tabs.iter().filter(|t| t.active).map(|t| t.id).collect();
        assert_eq!(active, vec![ids[2]]);
    }

    #[tokio::test]
    async fn test_no_window_fails() {
        let registry = TabRegistry::new();
        assert!(matches!(
            registry.get_current_window_id().await,
            Err(TabError::NoWindow)
        ));
        assert!(matches!(registry.get_tabs(None, None).await, Err(TabError::NoWindow)));
    }

    #[tokio::test]
    async fn test_focus_tab_focuses_its_window() {
        let (registry, _) = registry_with(1, 1);
        let other = registry.open_tab(2, "Other", "https://example.org", None).unwrap();
        assert_eq!(registry.get_current_window_id().await.unwrap(), 1);

        let mut events = registry.subscribe();
        registry.focus_tab(other).await.unwrap();

        assert_eq!(registry.get_current_window_id().await.unwrap(), 2);
        assert_eq!(
            events.recv().await.unwrap(),
            HostEvent::TabActivated { tab_id: other, window_id: 2 }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            HostEvent::WindowFocusChanged { window_id: Some(2) }
        );
    }

    #[tokio::test]
    async fn test_close_tab_reindexes_and_moves_active() {
        let (registry, ids) = registry_with(1, 3);
        let mut events = registry.subscribe();

        registry.close_tab(ids[0]).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), HostEvent::TabRemoved { tab_id: ids[0] });
        let tabs = registry.get_tabs(None, None).await.unwrap();
        let got: Vec<(TabId, usize, bool)> = tabs.iter().map(|t| (t.id, t.index, t.active)).collect();
        assert_eq!(got, vec![(ids[1], 0, true), (ids[2], 1, false)]);
    }

    #[tokio::test]
    async fn test_missing_tab_commands_fail() {
        let (registry, _) = registry_with(1, 1);
        assert!(matches!(registry.close_tab(99).await, Err(TabError::TabNotFound(99))));
        assert!(matches!(registry.focus_tab(99).await, Err(TabError::TabNotFound(99))));
        assert!(matches!(
            registry.focus_window(Some(42)),
            Err(TabError::WindowNotFound(42))
        ));
    }

    #[test]
    fn test_move_emits_only_for_shifted_tabs() {
        let (registry, ids) = registry_with(1, 3);
        let mut events = registry.subscribe();

        assert!(registry.move_tab(ids[1], 0).unwrap());
        assert_eq!(order(&registry, 1), vec![ids[1], ids[0], ids[2]]);
        assert_eq!(events.try_recv().unwrap(), HostEvent::TabMoved { tab_id: ids[1] });
        assert_eq!(events.try_recv().unwrap(), HostEvent::TabMoved { tab_id: ids[0] });
        assert!(events.try_recv().is_err());

        // Same place again: nothing happens
        assert!(!registry.move_tab(ids[1], 0).unwrap());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sync_replaces_model() {
        let (registry, _) = registry_with(1, 2);
        registry
            .sync(HostSnapshot {
                focused_window_id: Some(7),
                tabs: vec![
                    HostTab {
                        id: 40,
                        window_id: 7,
                        title: None,
                        url: Some("https://a.example".to_string()),
                        fav_icon_url: None,
                        opener_tab_id: None,
                        index: Some(0),
                    },
                    HostTab {
                        id: 41,
                        window_id: 7,
                        title: Some("B".to_string()),
                        url: None,
                        fav_icon_url: None,
                        opener_tab_id: Some(40),
                        index: None,
                    },
                ],
                active_tab_ids: vec![41],
            })
            .unwrap();

        let tabs = registry.get_tabs(None, None).await.unwrap();
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0].title, "(no title)");
        assert!(tabs.iter().find(|t| t.id == 41).unwrap().active);

        // New tabs never collide with synced ids
        let id = registry.open_tab(7, "C", "https://c.example", Some(41)).unwrap();
        assert!(id > 41);
    }

    #[tokio::test]
    async fn test_insert_tab_at_reported_position() {
        let (registry, ids) = registry_with(1, 2);
        let mut events = registry.subscribe();

        registry
            .insert_tab(HostTab {
                id: 90,
                window_id: 1,
                title: Some("Inserted".to_string()),
                url: None,
                fav_icon_url: None,
                opener_tab_id: Some(ids[0]),
                index: Some(1),
            })
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), HostEvent::TabCreated { tab_id: 90 });
        assert_eq!(order(&registry, 1), vec![ids[0], 90, ids[1]]);
        let tabs = registry.get_tabs(None, None).await.unwrap();
        let got: Vec<(TabId, usize)> = tabs.iter().map(|t| (t.id, t.index)).collect();
        assert_eq!(got, vec![(ids[0], 0), (90, 1), (ids[1], 2)]);

        // Fresh ids never collide with host ids
        assert!(registry.open_tab(1, "Next", "https://example.com", None).unwrap() > 90);
    }

    #[test]
    fn test_insert_known_id_replaces() {
        let (registry, ids) = registry_with(1, 2);
        registry
            .insert_tab(HostTab {
                id: ids[0],
                window_id: 1,
                title: Some("Again".to_string()),
                url: None,
                fav_icon_url: None,
                opener_tab_id: None,
                index: None,
            })
            .unwrap();

        assert_eq!(order(&registry, 1), vec![ids[1], ids[0]]);
        assert_eq!(registry.lock().unwrap().tabs.len(), 2);
    }

    #[tokio::test]
    async fn test_update_tab_emits_and_applies() {
        let (registry, ids) = registry_with(1, 1);
        let mut events = registry.subscribe();

        registry
            .update_tab(ids[0], Some("Renamed"), None, Some("https://example.com/favicon.ico"))
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), HostEvent::TabUpdated { tab_id: ids[0] });
        let tab = registry.get_tabs(None, None).await.unwrap().remove(0);
        assert_eq!(tab.title, "Renamed");
        assert_eq!(tab.url, "https://example.com");
        assert_eq!(tab.fav_icon_url.as_deref(), Some("https://example.com/favicon.ico"));
    }
}
