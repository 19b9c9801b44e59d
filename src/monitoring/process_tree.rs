use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::platform::{self, ProcessEntry, ProcessHandle};
use crate::state::{ProcessHelper, SystemSnapshot};

/// Rebuilds the tracked topology from one host process enumeration.
///
/// The enumeration is not topologically sorted: a child is only claimed
/// when its parent was seen earlier in this pass or in a previous one, so
/// deep chains converge over successive samples.
pub fn rebuild(snapshot: &mut SystemSnapshot, entries: &[ProcessEntry]) {
    rebuild_with(snapshot, entries, platform::open_tracked_handle)
}

pub fn rebuild_with(
    snapshot: &mut SystemSnapshot,
    entries: &[ProcessEntry],
    mut open: impl FnMut(u32) -> Option<ProcessHandle>,
) {
    snapshot.leaf_map.clear();
    if snapshot.tree_map.is_empty() || snapshot.helper_map.is_empty() {
        return;
    }

    // pid -> owning root, seeded with the tree-mode roots themselves
    let mut ancestor_of: BTreeMap<u32, u32> = BTreeMap::new();
    for (&pid, tree) in &snapshot.tree_map {
        if tree.is_tree {
            ancestor_of.insert(pid, pid);
        }
    }

    for entry in entries {
        let root = match ancestor_of.get(&entry.parent_pid) {
            Some(&root) => root,
            None => continue,
        };
        if snapshot.tree_map.contains_key(&entry.pid) {
            // nested registration: folded on the read side, never claimed
            snapshot
                .leaf_map
                .entry(entry.parent_pid)
                .or_default()
                .insert(entry.pid);
        } else {
            ancestor_of.insert(entry.pid, root);
        }
    }

    let assignments: Vec<(u32, u32)> = ancestor_of.iter().map(|(&pid, &root)| (pid, root)).collect();
    for (pid, root) in assignments {
        if !snapshot.tree_map.contains_key(&root) {
            continue;
        }
        match snapshot.helper_map.get(&pid).map(|helper| helper.root_pid) {
            Some(current_root) if current_root != root => {
                if let Some(old_tree) = snapshot.tree_map.get_mut(&current_root) {
                    old_tree.descendants.remove(&pid);
                }
                if let Some(tree) = snapshot.tree_map.get_mut(&root) {
                    tree.descendants.insert(pid);
                }
                if let Some(helper) = snapshot.helper_map.get_mut(&pid) {
                    helper.root_pid = root;
                }
            }
            Some(_) => {}
            None => {
                if let Some(handle) = open(pid) {
                    if let Some(tree) = snapshot.tree_map.get_mut(&root) {
                        tree.descendants.insert(pid);
                    }
                    snapshot.helper_map.insert(pid, ProcessHelper::new(root, handle));
                }
            }
        }
    }

    // transitive closure: a leaf entry absorbs the leaf sets of every
    // member that is itself a leaf key, at any depth
    let keys: Vec<u32> = snapshot.leaf_map.keys().copied().collect();
    for key in keys {
        let mut closed: BTreeSet<u32> = snapshot.leaf_map[&key].clone();
        let mut worklist: VecDeque<u32> = closed.iter().copied().collect();
        while let Some(pid) = worklist.pop_front() {
            if pid == key {
                continue;
            }
            if let Some(nested) = snapshot.leaf_map.get(&pid) {
                for &descendant in nested {
                    if closed.insert(descendant) {
                        worklist.push_back(descendant);
                    }
                }
            }
        }
        snapshot.leaf_map.insert(key, closed);
    }
}
