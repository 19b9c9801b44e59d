use std::collections::{BTreeMap, BTreeSet};

use crate::models::{GraphicsCard, ProcessResource, SystemResource};
use crate::platform::{self, ProcessHandle};

/// A registered root: whether descendants fold into it, and the set of
/// pids currently attributed to it. The root pid itself is a member of
/// its own descendant set for as long as its process lives.
pub struct ProcessTree {
    pub is_tree: bool,
    pub descendants: BTreeSet<u32>,
}

impl ProcessTree {
    pub fn new(root_pid: u32, is_tree: bool) -> Self {
        let mut descendants = BTreeSet::new();
        descendants.insert(root_pid);
        Self { is_tree, descendants }
    }
}

/// Per-tracked-pid record: the back-reference to the owning root, the
/// open handle, and the CPU baseline from the previous sample.
pub struct ProcessHelper {
    pub root_pid: u32,
    pub handle: ProcessHandle,
    pub last_cpu_wallclock: u64,
    pub last_cpu_busy: u64,
}

impl ProcessHelper {
    pub fn new(root_pid: u32, handle: ProcessHandle) -> Self {
        Self { root_pid, handle, last_cpu_wallclock: 0, last_cpu_busy: 0 }
    }
}

/// The one logical snapshot: host figures, per-root aggregates, and the
/// tracking tables the sampler rebuilds each tick. Lives under the
/// engine's single mutex; readers copy out of it.
#[derive(Default)]
pub struct SystemSnapshot {
    pub system: SystemResource,
    pub graphics_cards: Vec<GraphicsCard>,
    /// Transient, per-tick: nested roots discovered under each parent,
    /// transitively closed. Drives the read-side fold only.
    pub leaf_map: BTreeMap<u32, BTreeSet<u32>>,
    pub tree_map: BTreeMap<u32, ProcessTree>,
    pub helper_map: BTreeMap<u32, ProcessHelper>,
    pub sample_map: BTreeMap<u32, ProcessResource>,
}

impl SystemSnapshot {
    /// Registers `pid` as a root. Idempotent for existing roots; a pid
    /// currently tracked as a descendant is promoted in place without
    /// opening a second handle.
    pub fn append_root(&mut self, pid: u32, is_tree: bool) -> bool {
        self.append_root_with(pid, is_tree, platform::open_tracked_handle)
    }

    pub fn append_root_with(
        &mut self,
        pid: u32,
        is_tree: bool,
        open: impl FnOnce(u32) -> Option<ProcessHandle>,
    ) -> bool {
        if pid == 0 {
            return false;
        }

        if self.tree_map.contains_key(&pid) {
            return true;
        }

        if let Some(old_root) = self.helper_map.get(&pid).map(|helper| helper.root_pid) {
            if let Some(old_tree) = self.tree_map.get_mut(&old_root) {
                old_tree.descendants.remove(&pid);
            }
            if let Some(helper) = self.helper_map.get_mut(&pid) {
                helper.root_pid = pid;
            }
            self.tree_map.insert(pid, ProcessTree::new(pid, is_tree));
            self.sample_map.insert(pid, ProcessResource::default());
            return true;
        }

        match open(pid) {
            Some(handle) => {
                self.tree_map.insert(pid, ProcessTree::new(pid, is_tree));
                self.helper_map.insert(pid, ProcessHelper::new(pid, handle));
                self.sample_map.insert(pid, ProcessResource::default());
                true
            }
            None => false,
        }
    }

    /// Unregisters a root: drops every descendant helper (closing its
    /// handle unless it is the sentinel), then the aggregate and the root
    /// itself. Nested roots are independent registrations and stay.
    pub fn remove_root(&mut self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }

        let tree = match self.tree_map.remove(&pid) {
            Some(tree) => tree,
            None => return false,
        };
        for descendant in &tree.descendants {
            self.helper_map.remove(descendant);
        }
        self.sample_map.remove(&pid);
        true
    }

    /// Drops one tracked pid found dead mid-sample.
    pub fn drop_helper(&mut self, pid: u32) {
        if let Some(helper) = self.helper_map.remove(&pid) {
            if let Some(tree) = self.tree_map.get_mut(&helper.root_pid) {
                tree.descendants.remove(&pid);
            }
        }
    }

    /// Copy-out read for one root, folding in every nested root the leaf
    /// map attributes to it. Fails for pids that are not roots.
    pub fn process_resource(&self, pid: u32) -> Option<ProcessResource> {
        let mut resource = *self.sample_map.get(&pid)?;
        if let Some(leaves) = self.leaf_map.get(&pid) {
            for leaf in leaves {
                if let Some(sample) = self.sample_map.get(leaf) {
                    resource += sample;
                }
            }
        }
        if self.system.gpu_mem_total > 0 {
            resource.gpu_mem_bytes = resource.gpu_mem_bytes.min(self.system.gpu_mem_total);
        }
        Some(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_open(_pid: u32) -> Option<ProcessHandle> {
        Some(ProcessHandle::current())
    }

    fn deny_open(_pid: u32) -> Option<ProcessHandle> {
        None
    }

    #[test]
    fn append_rejects_pid_zero() {
        let mut snapshot = SystemSnapshot::default();
        assert!(!snapshot.append_root_with(0, true, fake_open));
        assert!(snapshot.tree_map.is_empty());
    }

    #[test]
    fn append_fails_when_handle_cannot_open() {
        let mut snapshot = SystemSnapshot::default();
        assert!(!snapshot.append_root_with(4242, false, deny_open));
        assert!(snapshot.tree_map.is_empty());
        assert!(snapshot.helper_map.is_empty());
        assert!(snapshot.sample_map.is_empty());
    }

    #[test]
    fn append_is_idempotent_for_existing_roots() {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(100, false, fake_open));
        assert!(snapshot.append_root_with(100, true, fake_open));
        assert_eq!(snapshot.tree_map.len(), 1);
        assert_eq!(snapshot.helper_map.len(), 1);
        // the tree bit keeps its original value
        assert!(!snapshot.tree_map[&100].is_tree);
    }

    #[test]
    fn append_then_remove_restores_map_sizes() {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(100, true, fake_open));
        assert!(snapshot.remove_root(100));
        assert!(snapshot.tree_map.is_empty());
        assert!(snapshot.helper_map.is_empty());
        assert!(snapshot.sample_map.is_empty());
    }

    #[test]
    fn remove_rejects_pid_zero_and_unknown_roots() {
        let mut snapshot = SystemSnapshot::default();
        assert!(!snapshot.remove_root(0));
        assert!(!snapshot.remove_root(31337));
    }

    #[test]
    fn tracked_descendant_is_promoted_without_a_second_handle() {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(100, true, fake_open));
        // simulate a discovered child of 100
        snapshot
            .helper_map
            .insert(101, ProcessHelper::new(100, ProcessHandle::current()));
        snapshot.tree_map.get_mut(&100).unwrap().descendants.insert(101);

        let mut opened = false;
        assert!(snapshot.append_root_with(101, false, |_| {
            opened = true;
            Some(ProcessHandle::current())
        }));
        assert!(!opened);
        assert!(!snapshot.tree_map[&100].descendants.contains(&101));
        assert!(snapshot.tree_map[&101].descendants.contains(&101));
        assert_eq!(snapshot.helper_map[&101].root_pid, 101);
        assert!(snapshot.sample_map.contains_key(&101));
    }

    #[test]
    fn remove_drops_descendant_helpers_but_not_nested_roots() {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(100, true, fake_open));
        assert!(snapshot.append_root_with(200, true, fake_open));
        snapshot
            .helper_map
            .insert(101, ProcessHelper::new(100, ProcessHandle::current()));
        snapshot.tree_map.get_mut(&100).unwrap().descendants.insert(101);

        assert!(snapshot.remove_root(100));
        assert!(!snapshot.helper_map.contains_key(&100));
        assert!(!snapshot.helper_map.contains_key(&101));
        // 200 is its own registration and survives
        assert!(snapshot.tree_map.contains_key(&200));
        assert!(snapshot.helper_map.contains_key(&200));
    }

    #[test]
    fn drop_helper_detaches_pid_from_its_root() {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(100, true, fake_open));
        snapshot
            .helper_map
            .insert(101, ProcessHelper::new(100, ProcessHandle::current()));
        snapshot.tree_map.get_mut(&100).unwrap().descendants.insert(101);

        snapshot.drop_helper(101);
        assert!(!snapshot.helper_map.contains_key(&101));
        assert!(!snapshot.tree_map[&100].descendants.contains(&101));
    }

    #[test]
    fn read_fails_for_pids_that_are_not_roots() {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(100, true, fake_open));
        snapshot
            .helper_map
            .insert(101, ProcessHelper::new(100, ProcessHandle::current()));
        assert!(snapshot.process_resource(101).is_none());
        assert!(snapshot.process_resource(31337).is_none());
        assert!(snapshot.process_resource(100).is_some());
    }

    #[test]
    fn read_folds_nested_roots_from_the_leaf_map() {
        let mut snapshot = SystemSnapshot::default();
        assert!(snapshot.append_root_with(100, true, fake_open));
        assert!(snapshot.append_root_with(200, true, fake_open));
        snapshot.sample_map.get_mut(&100).unwrap().ram_bytes = 1000;
        snapshot.sample_map.get_mut(&200).unwrap().ram_bytes = 500;
        snapshot.sample_map.get_mut(&200).unwrap().cpu_pct = 7.5;
        snapshot.leaf_map.entry(100).or_default().insert(200);

        let outer = snapshot.process_resource(100).unwrap();
        assert_eq!(outer.ram_bytes, 1500);
        assert_eq!(outer.cpu_pct, 7.5);
        // the nested root still reads on its own, unfolded
        let inner = snapshot.process_resource(200).unwrap();
        assert_eq!(inner.ram_bytes, 500);
    }

    #[test]
    fn folded_gpu_memory_is_clamped_to_the_total() {
        let mut snapshot = SystemSnapshot::default();
        snapshot.system.gpu_mem_total = 1000;
        assert!(snapshot.append_root_with(100, true, fake_open));
        assert!(snapshot.append_root_with(200, true, fake_open));
        snapshot.sample_map.get_mut(&100).unwrap().gpu_mem_bytes = 800;
        snapshot.sample_map.get_mut(&200).unwrap().gpu_mem_bytes = 600;
        snapshot.leaf_map.entry(100).or_default().insert(200);

        assert_eq!(snapshot.process_resource(100).unwrap().gpu_mem_bytes, 1000);
    }
}
