//! Retained element tree owned by the tab tree renderer.
//!
//! The tree mirrors the panel's DOM: a container holding either the empty
//! state message or a list of tab items, each item holding a row (favicon,
//! label, close control) and optionally a nested list of child items.
//!
//! Every mutation is recorded as a [`ViewPatch`] so the webview can replay it.
//! Setters only record a patch when the value actually changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::TabId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ElementKind {
    /// The panel's mount point. Always exists, never removed.
    Container,
    /// `ul.tab-tree`; `nested` lists carry `role=group`, the top one `role=tree`.
    List { nested: bool },
    /// `li.tab-tree-node` keyed by its tab.
    #[serde(rename_all = "camelCase")]
    Item { tab_id: TabId },
    Row,
    Favicon,
    Label,
    CloseButton,
    EmptyState,
}

/// Presentational state of one element. Which fields matter depends on the kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Props {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Tooltip on labels, accessible label on the close control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    pub hidden: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub props: Props,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Element {
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ViewPatch {
    Create { id: ElementId, kind: ElementKind, props: Props },
    /// Insert, or move if the element is already attached somewhere.
    Insert { parent: ElementId, id: ElementId, before: Option<ElementId> },
    /// Destroy the element and its subtree.
    Remove { id: ElementId },
    /// Take the element out of the document but keep it for a later insert.
    Detach { id: ElementId },
    SetActive { id: ElementId, active: bool },
    SetText { id: ElementId, text: String },
    SetTitle { id: ElementId, title: String },
    SetSrc { id: ElementId, src: String },
    SetHidden { id: ElementId, hidden: bool },
    SetDepth { id: ElementId, depth: usize },
}

impl ViewPatch {
    /// The element this patch mutates.
    pub fn target(&self) -> ElementId {
        match self {
            ViewPatch::Create { id, .. }
            | ViewPatch::Insert { id, .. }
            | ViewPatch::Remove { id }
            | ViewPatch::Detach { id }
            | ViewPatch::SetActive { id, .. }
            | ViewPatch::SetText { id, .. }
            | ViewPatch::SetTitle { id, .. }
            | ViewPatch::SetSrc { id, .. }
            | ViewPatch::SetHidden { id, .. }
            | ViewPatch::SetDepth { id, .. } => *id,
        }
    }
}

#[derive(Debug)]
pub struct ViewTree {
    elements: HashMap<ElementId, Element>,
    root: ElementId,
    next_id: u64,
    patches: Vec<ViewPatch>,
}

impl Default for ViewTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewTree {
    /// The container is element 0 and is not reported as a patch: the webview
    /// already has its mount point.
    pub fn new() -> Self {
        let root = ElementId(0);
        let mut elements = HashMap::new();
        elements.insert(
            root,
            Element {
                kind: ElementKind::Container,
                props: Props::default(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            elements,
            root,
            next_id: 1,
            patches: Vec::new(),
        }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.len() <= 1
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.elements
            .get(&id)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(&id).and_then(|e| e.parent)
    }

    pub fn item_tab_id(&self, id: ElementId) -> Option<TabId> {
        match self.elements.get(&id)?.kind {
            ElementKind::Item { tab_id } => Some(tab_id),
            _ => None,
        }
    }

    /// First direct child matching `pred`.
    pub fn find_child(&self, parent: ElementId, pred: impl Fn(&ElementKind) -> bool) -> Option<ElementId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.elements.get(c).is_some_and(|e| pred(&e.kind)))
    }

    /// Whether `id` is attached under the container.
    pub fn is_attached(&self, id: ElementId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Creates a detached element.
    pub fn create(&mut self, kind: ElementKind, props: Props) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.patches.push(ViewPatch::Create {
            id,
            kind: kind.clone(),
            props: props.clone(),
        });
        self.elements.insert(
            id,
            Element {
                kind,
                props,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn append(&mut self, parent: ElementId, child: ElementId) -> bool {
        let index = self.children(parent).len();
        self.insert(parent, child, index)
    }

    /// Places `child` at `index` of `parent`: inserted before the current
    /// occupant of that slot, or appended when `index` is past the end.
    /// Returns false (and records nothing) when it already sits there.
    pub fn insert(&mut self, parent: ElementId, child: ElementId, index: usize) -> bool {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return false;
        }
        let before = self.children(parent).get(index).copied();
        if before == Some(child) {
            return false;
        }
        if before.is_none() && self.children(parent).last() == Some(&child) {
            return false;
        }
        if self.is_ancestor(child, parent) {
            log::warn!("[TabTree] Refusing to insert {:?} under its own descendant", child);
            return false;
        }

        self.unlink(child);
        let Some(parent_el) = self.elements.get_mut(&parent) else {
            return false;
        };
        let position = before
            .and_then(|b| parent_el.children.iter().position(|&c| c == b))
            .unwrap_or(parent_el.children.len());
        parent_el.children.insert(position, child);
        if let Some(child_el) = self.elements.get_mut(&child) {
            child_el.parent = Some(parent);
        }

        self.patches.push(ViewPatch::Insert { parent, id: child, before });
        true
    }

    /// Takes `id` out of its parent without destroying it.
    pub fn detach(&mut self, id: ElementId) {
        if self.parent(id).is_some() {
            self.unlink(id);
            self.patches.push(ViewPatch::Detach { id });
        }
    }

    /// Destroys `id` and everything still under it.
    pub fn remove(&mut self, id: ElementId) {
        if id == self.root || !self.contains(id) {
            return;
        }
        self.unlink(id);
        self.patches.push(ViewPatch::Remove { id });
        self.free(id);
    }

    /// Destroys every child of `id`.
    pub fn clear(&mut self, id: ElementId) {
        for child in self.children(id).to_vec() {
            self.remove(child);
        }
    }

    fn unlink(&mut self, id: ElementId) {
        let Some(parent) = self.parent(id) else { return };
        if let Some(parent_el) = self.elements.get_mut(&parent) {
            parent_el.children.retain(|&c| c != id);
        }
        if let Some(el) = self.elements.get_mut(&id) {
            el.parent = None;
        }
    }

    fn free(&mut self, id: ElementId) {
        if let Some(el) = self.elements.remove(&id) {
            for child in el.children {
                self.free(child);
            }
        }
    }

    pub fn set_active(&mut self, id: ElementId, active: bool) -> bool {
        self.update(id, |p| p.active != active, |p| p.active = active, ViewPatch::SetActive { id, active })
    }

    pub fn set_text(&mut self, id: ElementId, text: &str) -> bool {
        self.update(
            id,
            |p| p.text.as_deref() != Some(text),
            |p| p.text = Some(text.to_string()),
            ViewPatch::SetText { id, text: text.to_string() },
        )
    }

    pub fn set_title(&mut self, id: ElementId, title: &str) -> bool {
        self.update(
            id,
            |p| p.title.as_deref() != Some(title),
            |p| p.title = Some(title.to_string()),
            ViewPatch::SetTitle { id, title: title.to_string() },
        )
    }

    pub fn set_src(&mut self, id: ElementId, src: &str) -> bool {
        self.update(
            id,
            |p| p.src.as_deref().unwrap_or("") != src,
            |p| p.src = Some(src.to_string()),
            ViewPatch::SetSrc { id, src: src.to_string() },
        )
    }

    pub fn set_hidden(&mut self, id: ElementId, hidden: bool) -> bool {
        self.update(id, |p| p.hidden != hidden, |p| p.hidden = hidden, ViewPatch::SetHidden { id, hidden })
    }

    pub fn set_depth(&mut self, id: ElementId, depth: usize) -> bool {
        self.update(
            id,
            |p| p.depth != Some(depth),
            |p| p.depth = Some(depth),
            ViewPatch::SetDepth { id, depth },
        )
    }

    fn update(
        &mut self,
        id: ElementId,
        differs: impl FnOnce(&Props) -> bool,
        apply: impl FnOnce(&mut Props),
        patch: ViewPatch,
    ) -> bool {
        let Some(el) = self.elements.get_mut(&id) else {
            return false;
        };
        if !differs(&el.props) {
            return false;
        }
        apply(&mut el.props);
        self.patches.push(patch);
        true
    }

    /// Drains the patches recorded since the last call.
    pub fn take_patches(&mut self) -> Vec<ViewPatch> {
        std::mem::take(&mut self.patches)
    }
}
