//! Incremental tab tree renderer.
//!
//! Keeps the retained [`ViewTree`] in step with the latest opener forest,
//! touching only the elements whose tab changed so rows keep their focus and
//! scroll state across refreshes. Item elements are found through a tab id
//! index, so a row can follow its tab to a different level of the tree.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::modules::tab_service::TabAction;
use crate::modules::view::{ElementId, ElementKind, Props, ViewPatch, ViewTree};
use crate::settings::PanelSettings;
use crate::state::{Tab, TabId, TreeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointerButton {
    Primary,
    /// Middle button, delivered as `auxclick`.
    Auxiliary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEvent {
    pub target: ElementId,
    pub button: PointerButton,
}

pub struct TabTreeRenderer {
    view: ViewTree,
    settings: PanelSettings,
    list: Option<ElementId>,
    empty_state: Option<ElementId>,
    /// Item element of every tab currently rendered.
    items: HashMap<TabId, ElementId>,
    /// Forest of the last non-empty render; `None` after an empty one.
    last_tree: Option<Vec<TreeNode>>,
}

impl TabTreeRenderer {
    pub fn new(settings: PanelSettings) -> Self {
        Self {
            view: ViewTree::new(),
            settings,
            list: None,
            empty_state: None,
            items: HashMap::new(),
            last_tree: None,
        }
    }

    pub fn view(&self) -> &ViewTree {
        &self.view
    }

    pub fn last_tree(&self) -> Option<&[TreeNode]> {
        self.last_tree.as_deref()
    }

    /// Item element rendering `tab_id`, if any.
    pub fn element_for(&self, tab_id: TabId) -> Option<ElementId> {
        self.items.get(&tab_id).copied()
    }

    /// Brings the view in line with `tree` and returns the patches applied.
    pub fn render(&mut self, tree: Vec<TreeNode>) -> Vec<ViewPatch> {
        if tree.is_empty() {
            self.show_empty_state();
            return self.view.take_patches();
        }

        let previous = self.last_tree.take().unwrap_or_default();
        let mut stored: HashMap<TabId, &TreeNode> = HashMap::new();
        for root in &previous {
            root.walk(&mut |n| {
                stored.insert(n.tab.id, n);
            });
        }

        let mut live: HashSet<TabId> = HashSet::new();
        for root in &tree {
            root.walk(&mut |n| {
                live.insert(n.tab.id);
            });
        }

        let list = self.get_or_create_list();
        self.reconcile(list, &tree, &stored, &live);
        self.sweep_detached(&live);

        let patches = self.view.take_patches();
        log::debug!(
            "[TabTree] Rendered {} tabs with {} patches",
            live.len(),
            patches.len()
        );
        self.last_tree = Some(tree);
        patches
    }

    /// Drops the whole view; the next render starts from an empty container.
    pub fn reset(&mut self) {
        self.view = ViewTree::new();
        self.list = None;
        self.empty_state = None;
        self.items.clear();
        self.last_tree = None;
    }

    fn show_empty_state(&mut self) {
        self.last_tree = None;
        self.items.clear();
        self.list = None;
        if self.empty_state.is_some_and(|e| self.view.contains(e)) {
            return;
        }

        let root = self.view.root();
        self.view.clear(root);
        let message = self.view.create(
            ElementKind::EmptyState,
            Props {
                text: Some(self.settings.empty_state_text.clone()),
                ..Props::default()
            },
        );
        self.view.append(root, message);
        self.empty_state = Some(message);
    }

    fn get_or_create_list(&mut self) -> ElementId {
        if let Some(list) = self.list.filter(|&l| self.view.contains(l)) {
            return list;
        }
        let root = self.view.root();
        self.view.clear(root);
        self.empty_state = None;

        let list = self.view.create(ElementKind::List { nested: false }, Props::default());
        self.view.append(root, list);
        self.list = Some(list);
        list
    }

    fn reconcile(
        &mut self,
        list: ElementId,
        nodes: &[TreeNode],
        stored: &HashMap<TabId, &TreeNode>,
        live: &HashSet<TabId>,
    ) {
        let old_items: Vec<ElementId> = self
            .view
            .children(list)
            .iter()
            .copied()
            .filter(|&c| self.view.item_tab_id(c).is_some())
            .collect();

        // Closed tabs go first so surviving rows are already in their slots.
        for old in old_items {
            match self.view.item_tab_id(old) {
                Some(tab_id) if !live.contains(&tab_id) => self.discard(old, live),
                _ => {}
            }
        }

        for (i, node) in nodes.iter().enumerate() {
            let item = match self.items.get(&node.tab.id).copied() {
                Some(item) => {
                    self.update_node_content(item, node);
                    self.view.insert(list, item, i);
                    item
                }
                None => {
                    let item = self.create_node(node);
                    self.view.insert(list, item, i);
                    item
                }
            };

            let child_list = self
                .view
                .find_child(item, |k| matches!(k, ElementKind::List { .. }));
            if node.children.is_empty() {
                if let Some(child_list) = child_list {
                    self.discard(child_list, live);
                }
                continue;
            }

            let child_list = match child_list {
                Some(child_list) => {
                    let unchanged = stored
                        .get(&node.tab.id)
                        .is_some_and(|prev| prev.children == node.children);
                    if unchanged {
                        continue;
                    }
                    child_list
                }
                None => {
                    let child_list = self
                        .view
                        .create(ElementKind::List { nested: true }, Props::default());
                    self.view.append(item, child_list);
                    child_list
                }
            };
            self.reconcile(child_list, &node.children, stored, live);
        }
    }

    /// Destroys `element`. Items below it whose tab is still live are only
    /// detached; they are re-inserted when their node is visited.
    fn discard(&mut self, element: ElementId, live: &HashSet<TabId>) {
        self.release(element, live);
        if let Some(tab_id) = self.view.item_tab_id(element) {
            if self.items.get(&tab_id) == Some(&element) {
                self.items.remove(&tab_id);
            }
        }
        self.view.remove(element);
    }

    fn release(&mut self, element: ElementId, live: &HashSet<TabId>) {
        for child in self.view.children(element).to_vec() {
            match self.view.item_tab_id(child) {
                Some(tab_id) if live.contains(&tab_id) => self.view.detach(child),
                Some(tab_id) => {
                    self.items.remove(&tab_id);
                    self.release(child, live);
                }
                None => self.release(child, live),
            }
        }
    }

    /// Anything still detached after a full pass has no place in the tree.
    fn sweep_detached(&mut self, live: &HashSet<TabId>) {
        let stranded: Vec<(TabId, ElementId)> = self
            .items
            .iter()
            .filter(|(tab_id, item)| !live.contains(*tab_id) || !self.view.is_attached(**item))
            .map(|(&tab_id, &item)| (tab_id, item))
            .collect();
        for (tab_id, item) in stranded {
            log::warn!("[TabTree] Dropping stranded element for tab {}", tab_id);
            self.items.remove(&tab_id);
            self.view.remove(item);
        }
    }

    fn display_title<'a>(&'a self, tab: &'a Tab) -> &'a str {
        if tab.title.is_empty() {
            &self.settings.untitled_title
        } else {
            &tab.title
        }
    }

    fn update_node_content(&mut self, item: ElementId, node: &TreeNode) {
        self.view.set_depth(item, node.depth);

        let Some(row) = self.view.find_child(item, |k| *k == ElementKind::Row) else {
            return;
        };
        self.view.set_active(row, node.tab.active);

        let title = self.display_title(&node.tab).to_string();
        if let Some(label) = self.view.find_child(row, |k| *k == ElementKind::Label) {
            let shown = self.view.get(label).and_then(|e| e.props.text.as_deref());
            if shown != Some(title.as_str()) {
                self.view.set_text(label, &title);
                self.view.set_title(label, &node.tab.url);
            }
        }

        if let Some(favicon) = self.view.find_child(row, |k| *k == ElementKind::Favicon) {
            let src = node.tab.fav_icon_url.as_deref().unwrap_or("");
            if self.view.set_src(favicon, src) {
                self.view.set_hidden(favicon, src.is_empty());
            }
        }
    }

    /// Creates the item and its row. Children are filled in by `reconcile`.
    fn create_node(&mut self, node: &TreeNode) -> ElementId {
        let tab = &node.tab;
        let title = self.display_title(tab).to_string();
        let close_glyph = self.settings.close_glyph.clone();
        let close_label = self.settings.close_label.clone();

        let item = self.view.create(
            ElementKind::Item { tab_id: tab.id },
            Props {
                depth: Some(node.depth),
                ..Props::default()
            },
        );
        let row = self.view.create(
            ElementKind::Row,
            Props {
                active: tab.active,
                ..Props::default()
            },
        );
        let src = tab.fav_icon_url.clone().unwrap_or_default();
        let favicon = self.view.create(
            ElementKind::Favicon,
            Props {
                hidden: src.is_empty(),
                src: Some(src),
                ..Props::default()
            },
        );
        let label = self.view.create(
            ElementKind::Label,
            Props {
                text: Some(title),
                title: Some(tab.url.clone()),
                ..Props::default()
            },
        );
        let close = self.view.create(
            ElementKind::CloseButton,
            Props {
                text: Some(close_glyph),
                title: Some(close_label),
                ..Props::default()
            },
        );

        self.view.append(row, favicon);
        self.view.append(row, label);
        self.view.append(row, close);
        self.view.append(item, row);
        self.items.insert(tab.id, item);
        item
    }

    /// Hides a favicon whose image failed to load.
    pub fn icon_failed(&mut self, element: ElementId) -> Vec<ViewPatch> {
        if self.view.get(element).is_some_and(|e| e.kind == ElementKind::Favicon) {
            self.view.set_hidden(element, true);
        }
        self.view.take_patches()
    }

    /// Maps a click on the tree to a tab action.
    ///
    /// The close control swallows the click, so it never also focuses the row.
    /// Rows focus on primary click and close on middle click.
    pub fn resolve_pointer(&self, event: PointerEvent) -> Option<TabAction> {
        let mut cursor = Some(event.target);
        while let Some(current) = cursor {
            let element = self.view.get(current)?;
            match element.kind {
                ElementKind::CloseButton => {
                    return match event.button {
                        PointerButton::Primary | PointerButton::Auxiliary => {
                            self.owning_tab(current).map(TabAction::Close)
                        }
                        PointerButton::Secondary => None,
                    };
                }
                ElementKind::Row => {
                    let tab_id = self.owning_tab(current)?;
                    return match event.button {
                        PointerButton::Primary => Some(TabAction::Focus(tab_id)),
                        PointerButton::Auxiliary => Some(TabAction::Close(tab_id)),
                        PointerButton::Secondary => None,
                    };
                }
                ElementKind::Item { .. } | ElementKind::List { .. } | ElementKind::Container => {
                    return None;
                }
                _ => cursor = element.parent(),
            }
        }
        None
    }

    fn owning_tab(&self, element: ElementId) -> Option<TabId> {
        let mut cursor = self.view.parent(element);
        while let Some(current) = cursor {
            if let Some(tab_id) = self.view.item_tab_id(current) {
                return Some(tab_id);
            }
            cursor = self.view.parent(current);
        }
        None
    }
}
