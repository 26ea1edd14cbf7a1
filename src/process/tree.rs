//! Process-tree snapshots.
//!
//! A [`ProcessTable`] is a point-in-time view of every process on the host.
//! The stop path takes one before signalling anything, so descendants that
//! get reparented once their parent dies are still known and can be killed.

use std::collections::{HashMap, HashSet, VecDeque};

use sysinfo::{ProcessStatus, System};

/// Point-in-time parent/child view of the host's processes.
pub(crate) struct ProcessTable {
    children: HashMap<u32, Vec<u32>>,
    live: HashSet<u32>,
}

impl ProcessTable {
    /// Reads the process list. Blocking; call it from a blocking thread.
    pub(crate) fn snapshot() -> Self {
        let mut sys = System::new();
        sys.refresh_processes();

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut live = HashSet::new();
        for (pid, process) in sys.processes() {
            let pid = pid.as_u32();
            if process.status() != ProcessStatus::Zombie {
                live.insert(pid);
            }
            if let Some(parent) = process.parent() {
                children.entry(parent.as_u32()).or_default().push(pid);
            }
        }
        Self { children, live }
    }

    /// Every descendant of `root`, parents before their children. `root` itself is excluded.
    pub(crate) fn descendants(&self, root: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(pid) = queue.pop_front() {
            for &child in self.children.get(&pid).into_iter().flatten() {
                if seen.insert(child) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }

    /// Whether `pid` exists and is not a zombie.
    pub(crate) fn is_alive(&self, pid: u32) -> bool {
        self.live.contains(&pid)
    }
}

#[cfg(test)]
impl ProcessTable {
    fn from_edges(edges: &[(u32, u32)]) -> Self {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut live = HashSet::new();
        for &(parent, child) in edges {
            children.entry(parent).or_default().push(child);
            live.insert(parent);
            live.insert(child);
        }
        Self { children, live }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendants_breadth_first() {
        let table = ProcessTable::from_edges(&[(1, 10), (10, 11), (10, 12), (11, 13), (2, 20)]);
        assert_eq!(table.descendants(10), vec![11, 12, 13]);
        assert_eq!(table.descendants(1), vec![10, 11, 12, 13]);
        assert!(table.descendants(13).is_empty());
    }

    #[test]
    fn test_snapshot_sees_current_process() {
        let table = ProcessTable::snapshot();
        assert!(table.is_alive(std::process::id()));
    }
}
