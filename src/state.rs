// Shared data model for the tab tree.
// These are used by the builder, the renderer and the host bridge and can be tested independently.

use serde::{Deserialize, Serialize};

pub type TabId = i64;
pub type WindowId = i64;

/// Title used when the host does not report one.
pub const PLACEHOLDER_TITLE: &str = "(no title)";

/// A tab as the panel sees it. Rebuilt on every refresh, never mutated by the panel.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub fav_icon_url: Option<String>,
    pub opener_tab_id: Option<TabId>,
    pub window_id: WindowId,
    pub index: usize,
    pub active: bool,
}

/// Raw tab record as reported by the host. Any descriptive field may be missing.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostTab {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub opener_tab_id: Option<TabId>,
    #[serde(default)]
    pub index: Option<usize>,
}

impl HostTab {
    /// Fills in defaults for missing fields and stamps the active flag.
    pub fn to_tab(&self, active_tab_id: Option<TabId>) -> Tab {
        Tab {
            id: self.id,
            title: self
                .title
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            url: self.url.clone().unwrap_or_default(),
            fav_icon_url: self.fav_icon_url.clone().filter(|u| !u.is_empty()),
            opener_tab_id: self.opener_tab_id,
            window_id: self.window_id,
            index: self.index.unwrap_or(0),
            active: Some(self.id) == active_tab_id,
        }
    }
}

/// Full host state pushed by the shell: every tab plus the focused window and
/// the active tab of each window.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub focused_window_id: Option<WindowId>,
    pub tabs: Vec<HostTab>,
    #[serde(default)]
    pub active_tab_ids: Vec<TabId>,
}

/// One node of the opener forest.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub tab: Tab,
    pub children: Vec<TreeNode>,
    pub depth: usize,
}

impl TreeNode {
    /// Number of nodes in this subtree, including self.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::len).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Pre-order walk over this subtree.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TreeNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}
