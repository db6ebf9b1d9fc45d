//! Plain presentation model of the node list: one row per slot.
//!
//! A new node appends a row, further frames refresh its sequence number and data
//! inputs, sweeps flip the status column, and a reset empties the table.
use std::fmt::Write;

use serde::Serialize;

use crate::monitor::{FrameUpdate, NodeSink};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRow {
    pub node_id: u32,
    /// Group from the node's first frame.
    pub group: Option<u8>,
    pub seq: Option<u8>,
    pub inputs: [u8; 4],
    pub alive: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct NodeTable {
    rows: Vec<NodeRow>,
    desync_events: u64,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[NodeRow] {
        &self.rows
    }

    pub fn row(&self, slot: usize) -> Option<&NodeRow> {
        self.rows.get(slot)
    }

    pub fn desync_events(&self) -> u64 {
        self.desync_events
    }

    /// Fixed-width text rendering, one line per slot after a header.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>4} {:>5} {:>5} {:>4} {:>4} {:>4} {:>4} {:>4}  STATUS",
            "SLOT", "GROUP", "NODE", "SEQ", "DI1", "DI2", "DI3", "DI4"
        );
        for (slot, row) in self.rows.iter().enumerate() {
            let group = row.group.map(|g| g.to_string()).unwrap_or_else(|| "-".into());
            let seq = row.seq.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
            let [d1, d2, d3, d4] = row.inputs;
            let _ = writeln!(
                out,
                "{:>4} {:>5} {:>5} {:>4} {:>4} {:>4} {:>4} {:>4}  {}",
                slot,
                group,
                row.node_id,
                seq,
                d1,
                d2,
                d3,
                d4,
                if row.alive { "alive" } else { "DEAD" }
            );
        }
        out
    }
}

impl NodeSink for NodeTable {
    fn on_new_node(&mut self, slot: usize, node_id: u32) {
        // slots are dense, so a new node always lands at the end
        debug_assert_eq!(slot, self.rows.len());
        self.rows.push(NodeRow {
            node_id,
            group: None,
            seq: None,
            inputs: [0; 4],
            alive: true,
        });
    }

    fn on_frame(&mut self, slot: usize, update: &FrameUpdate) {
        if let Some(row) = self.rows.get_mut(slot) {
            row.group.get_or_insert(update.group);
            row.seq = Some(update.seq);
            row.inputs = update.inputs;
        }
    }

    fn on_liveness(&mut self, slot: usize, alive: bool) {
        if let Some(row) = self.rows.get_mut(slot) {
            row.alive = alive;
        }
    }

    fn on_reset(&mut self) {
        self.rows.clear();
    }

    fn on_desync(&mut self, _run: u32) {
        self.desync_events += 1;
    }
}
