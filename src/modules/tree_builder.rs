// Opener tree construction - pure logic, no host or view imports.

use std::collections::{HashMap, HashSet};

use crate::state::{Tab, TabId, TreeNode};

/// Builds the opener forest from a flat tab list.
///
/// Algorithm:
/// 1. Key every tab by id (a duplicate id shadows the earlier entry)
/// 2. Link each tab under its opener if the opener is present, else make it a root
/// 3. Promote tabs stranded by an opener cycle to roots so none is lost
/// 4. Sort roots and every child list by position, stamping depth top-down
pub fn build(tabs: &[Tab]) -> Vec<TreeNode> {
    let slots: HashMap<TabId, usize> = tabs.iter().enumerate().map(|(i, t)| (t.id, i)).collect();

    let mut children: HashMap<TabId, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();

    for (slot, tab) in tabs.iter().enumerate() {
        if slots.get(&tab.id) != Some(&slot) {
            continue;
        }
        match tab.opener_tab_id.filter(|opener| slots.contains_key(opener)) {
            Some(opener) => children.entry(opener).or_default().push(slot),
            None => roots.push(slot),
        }
    }

    promote_cycles(tabs, &slots, &mut children, &mut roots);

    attach(tabs, roots, &mut children, 0)
}

/// Tabs whose opener chain loops back on itself are never reached from a root.
/// Break each loop at its lowest-positioned member.
fn promote_cycles(
    tabs: &[Tab],
    slots: &HashMap<TabId, usize>,
    children: &mut HashMap<TabId, Vec<usize>>,
    roots: &mut Vec<usize>,
) {
    let mut reached: HashSet<usize> = HashSet::with_capacity(slots.len());
    for &root in roots.iter() {
        mark_reached(tabs, root, children, &mut reached);
    }

    while reached.len() < slots.len() {
        let stranded = slots
            .values()
            .copied()
            .filter(|slot| !reached.contains(slot))
            .min_by_key(|&slot| (tabs[slot].index, slot));
        let Some(stranded) = stranded else { break };
        let slot = cycle_head(tabs, slots, stranded);

        if let Some(opener) = tabs[slot].opener_tab_id {
            if let Some(siblings) = children.get_mut(&opener) {
                siblings.retain(|&s| s != slot);
            }
        }
        log::debug!("[TabTree] Opener cycle broken at tab {}", tabs[slot].id);
        roots.push(slot);
        mark_reached(tabs, slot, children, &mut reached);
    }
}

/// Follows openers up from a stranded tab until the chain loops, and returns
/// the lowest-positioned member of that loop. Tabs hanging off the loop keep
/// their opener.
fn cycle_head(tabs: &[Tab], slots: &HashMap<TabId, usize>, start: usize) -> usize {
    let mut seen: Vec<usize> = Vec::new();
    let mut cursor = start;
    loop {
        if let Some(pos) = seen.iter().position(|&s| s == cursor) {
            return seen[pos..]
                .iter()
                .copied()
                .min_by_key(|&slot| (tabs[slot].index, slot))
                .unwrap_or(cursor);
        }
        seen.push(cursor);
        match tabs[cursor].opener_tab_id.and_then(|opener| slots.get(&opener)) {
            Some(&next) => cursor = next,
            // Chain ends at a present root; cannot happen for a stranded tab
            None => return cursor,
        }
    }
}

fn mark_reached(
    tabs: &[Tab],
    slot: usize,
    children: &HashMap<TabId, Vec<usize>>,
    reached: &mut HashSet<usize>,
) {
    if !reached.insert(slot) {
        return;
    }
    if let Some(kids) = children.get(&tabs[slot].id) {
        for &kid in kids {
            mark_reached(tabs, kid, children, reached);
        }
    }
}

fn attach(
    tabs: &[Tab],
    mut slots: Vec<usize>,
    children: &mut HashMap<TabId, Vec<usize>>,
    depth: usize,
) -> Vec<TreeNode> {
    // Stable: equal positions keep input order
    slots.sort_by_key(|&slot| tabs[slot].index);
    slots
        .into_iter()
        .map(|slot| {
            let tab = &tabs[slot];
            let kids = children.remove(&tab.id).unwrap_or_default();
            TreeNode {
                tab: tab.clone(),
                children: attach(tabs, kids, children, depth + 1),
                depth,
            }
        })
        .collect()
}
