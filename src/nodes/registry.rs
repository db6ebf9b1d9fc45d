//! Node registry: stable display slots and edge-triggered liveness.
//!
//! A node gets a slot the first time it is observed. Slots are handed out densely
//! in first-seen order and never change or get reused until [`NodeRegistry::clear`].
//! Each [`NodeRegistry::sweep`] reports whether a node was heard since the previous
//! sweep and then forgets it, so a silent node reads as dead on every sweep.
use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

/// Default number of nodes a registry will track.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Every slot is taken; the registry was not modified.
    #[error("node registry full ({capacity} slots), cannot register node {node_id}")]
    CapacityExceeded { capacity: usize, node_id: u32 },
    #[error("node id 0 is not a valid node")]
    InvalidNodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeEntry {
    pub node_id: u32,
    pub slot: usize,
    pub alive: bool,
}

/// Result of a successful [`NodeRegistry::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub slot: usize,
    pub is_new: bool,
}

/// One node's report from a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Liveness {
    pub slot: usize,
    pub node_id: u32,
    pub alive: bool,
}

#[derive(Debug)]
pub struct NodeRegistry {
    // entries[i].slot == i
    entries: Vec<NodeEntry>,
    index: HashMap<u32, usize>,
    // nodes already warned about while full
    turned_away: HashSet<u32>,
    capacity: usize,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            turned_away: HashSet::new(),
            capacity,
        }
    }

    /// Record that `node_id` was heard, registering it on first sight.
    pub fn observe(&mut self, node_id: u32) -> Result<Observation, RegistryError> {
        if node_id == 0 {
            return Err(RegistryError::InvalidNodeId);
        }
        if let Some(&slot) = self.index.get(&node_id) {
            self.entries[slot].alive = true;
            return Ok(Observation {
                slot,
                is_new: false,
            });
        }
        if self.entries.len() >= self.capacity {
            if self.turned_away.insert(node_id) {
                warn!(
                    "registry full ({} slots), rejecting node {}",
                    self.capacity, node_id
                );
            } else {
                debug!("registry full, node {} still untracked", node_id);
            }
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity,
                node_id,
            });
        }
        let slot = self.entries.len();
        self.entries.push(NodeEntry {
            node_id,
            slot,
            alive: true,
        });
        self.index.insert(node_id, slot);
        info!("new node {} in slot {}", node_id, slot);
        Ok(Observation { slot, is_new: true })
    }

    /// Report every node's liveness in slot order, then reset all flags.
    pub fn sweep(&mut self) -> Vec<Liveness> {
        self.entries
            .iter_mut()
            .map(|entry| {
                let report = Liveness {
                    slot: entry.slot,
                    node_id: entry.node_id,
                    alive: entry.alive,
                };
                entry.alive = false;
                report
            })
            .collect()
    }

    /// Forget every node; the next new node gets slot 0 again.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.turned_away.clear();
    }

    pub fn get(&self, node_id: u32) -> Option<&NodeEntry> {
        self.index.get(&node_id).map(|&slot| &self.entries[slot])
    }

    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    /// Number of registered nodes, which is also the next slot to be assigned.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Distinct nodes rejected for lack of room since the last clear.
    pub fn turned_away(&self) -> usize {
        self.turned_away.len()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_first_seen_order() {
        let mut reg = NodeRegistry::new();
        let seen: Vec<(usize, bool)> = [5, 9, 5, 12, 9]
            .iter()
            .map(|&id| {
                let obs = reg.observe(id).unwrap();
                (obs.slot, obs.is_new)
            })
            .collect();
        assert_eq!(
            seen,
            vec![(0, true), (1, true), (0, false), (2, true), (1, false)]
        );
        assert_eq!(reg.depth(), 3);
    }

    #[test]
    fn liveness_is_edge_triggered() {
        let mut reg = NodeRegistry::new();
        reg.observe(5).unwrap();
        let alive: Vec<bool> = (0..3).map(|_| reg.sweep()[0].alive).collect();
        assert_eq!(alive, vec![true, false, false]);
    }

    #[test]
    fn sweep_reports_in_slot_order_and_keeps_slots() {
        let mut reg = NodeRegistry::new();
        reg.observe(40).unwrap();
        reg.observe(3).unwrap();
        reg.sweep();
        reg.observe(3).unwrap();
        let report = reg.sweep();
        assert_eq!(
            report,
            vec![
                Liveness { slot: 0, node_id: 40, alive: false },
                Liveness { slot: 1, node_id: 3, alive: true },
            ]
        );
        assert_eq!(reg.get(40).map(|e| e.slot), Some(0));
    }

    #[test]
    fn capacity_overflow_leaves_registry_untouched() {
        let mut reg = NodeRegistry::with_capacity(2);
        reg.observe(1).unwrap();
        reg.observe(2).unwrap();
        let before = reg.entries().to_vec();

        let err = reg.observe(3).unwrap_err();
        assert_eq!(
            err,
            RegistryError::CapacityExceeded {
                capacity: 2,
                node_id: 3
            }
        );
        assert_eq!(reg.entries(), &before[..]);
        assert!(reg.get(3).is_none());

        // known nodes still work at capacity
        assert_eq!(reg.observe(2).unwrap(), Observation { slot: 1, is_new: false });
    }

    #[test]
    fn repeated_rejections_are_tracked_once_per_node() {
        let mut reg = NodeRegistry::with_capacity(1);
        reg.observe(1).unwrap();
        for _ in 0..50 {
            assert!(reg.observe(7).is_err());
        }
        assert_eq!(reg.turned_away(), 1);
        assert!(reg.observe(8).is_err());
        assert_eq!(reg.turned_away(), 2);

        reg.clear();
        assert_eq!(reg.turned_away(), 0);
    }

    #[test]
    fn clear_restarts_slot_numbering() {
        let mut reg = NodeRegistry::new();
        reg.observe(9).unwrap();
        reg.observe(5).unwrap();
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.observe(5).unwrap(), Observation { slot: 0, is_new: true });
        assert!(reg.sweep().len() == 1);
    }

    #[test]
    fn zero_node_id_is_rejected() {
        let mut reg = NodeRegistry::new();
        assert_eq!(reg.observe(0), Err(RegistryError::InvalidNodeId));
        assert!(reg.is_empty());
    }
}
