//! # Monitor
//!
//! Glue between the link layer and node tracking. A [`Monitor`] owns one frame
//! reassembler and one node registry for a single serial session and pushes every
//! observable change into a [`NodeSink`].
//!
//! The three inputs are:
//!
//! - [`Monitor::deliver_chunk`] - raw bytes from the link, any size, any alignment
//! - [`Monitor::tick`] - a liveness sweep, normally driven by a periodic timer
//! - [`Monitor::reset`] - forget all nodes (the accumulator is left alone)
//!
//! All three take `&mut self`, so a monitor is driven by exactly one owner. When the
//! inputs come from different threads or tasks, run it behind [`start_monitor`],
//! which serializes them through a single queue.
//!
//! ```rust
//! use nodewatch::link::Frame;
//! use nodewatch::monitor::{Monitor, MonitorOptions};
//! use nodewatch::nodes::NodeTable;
//!
//! let mut monitor = Monitor::new(MonitorOptions::default(), NodeTable::new());
//! monitor.deliver_chunk(&Frame::encode(1, 5, 0, [0; 4]));
//! let report = monitor.tick();
//! assert!(report[0].alive);
//! assert_eq!(monitor.sink().rows()[0].node_id, 5);
//! ```

pub mod task;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::error::{NodewatchError, Result};
use crate::link::{
    hex_preview, to_hex_string, Frame, FrameReassembler, FramingMode, LinkEvent,
    ReassemblyStats, DEFAULT_DESYNC_THRESHOLD,
};
use crate::metrics;
use crate::nodes::{Liveness, NodeRegistry, RegistryError, DEFAULT_CAPACITY};

pub use task::{
    start_monitor, MonitorCommand, MonitorHandle, MonitorTaskConfig, DEFAULT_QUEUE_DEPTH,
};

/// Payload fields of a frame as shown to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameUpdate {
    pub node_id: u32,
    pub group: u8,
    pub seq: u8,
    pub inputs: [u8; 4],
}

impl From<&Frame> for FrameUpdate {
    fn from(frame: &Frame) -> Self {
        Self {
            node_id: frame.node_id() as u32,
            group: frame.group(),
            seq: frame.seq(),
            inputs: frame.inputs(),
        }
    }
}

/// Receiver of presentation updates. Called synchronously from the monitor.
pub trait NodeSink {
    /// A node was heard for the first time and now owns `slot`.
    fn on_new_node(&mut self, slot: usize, node_id: u32);
    /// A valid frame arrived for the node in `slot` (also fired right after `on_new_node`).
    fn on_frame(&mut self, slot: usize, update: &FrameUpdate);
    /// Sweep result for one node.
    fn on_liveness(&mut self, slot: usize, alive: bool);
    /// Every node of one sweep has been reported.
    fn on_sweep_end(&mut self) {}
    fn on_reset(&mut self) {}
    fn on_desync(&mut self, _run: u32) {}
    fn on_capacity_exceeded(&mut self, _node_id: u32) {}
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NodeSink for NullSink {
    fn on_new_node(&mut self, _slot: usize, _node_id: u32) {}
    fn on_frame(&mut self, _slot: usize, _update: &FrameUpdate) {}
    fn on_liveness(&mut self, _slot: usize, _alive: bool) {}
}

/// A panic while the other side held the lock does not stop updates; the sink state
/// is taken as is.
fn lock_sink<T>(sink: &Mutex<T>) -> MutexGuard<'_, T> {
    sink.lock().unwrap_or_else(|poisoned| {
        warn!("node sink lock poisoned, continuing with its current state");
        sink.clear_poison();
        PoisonError::into_inner(poisoned)
    })
}

/// Lets a sink be shared with whoever renders it while a monitor task owns the other handle.
impl<T: NodeSink> NodeSink for Arc<Mutex<T>> {
    fn on_new_node(&mut self, slot: usize, node_id: u32) {
        lock_sink(self).on_new_node(slot, node_id);
    }
    fn on_frame(&mut self, slot: usize, update: &FrameUpdate) {
        lock_sink(self).on_frame(slot, update);
    }
    fn on_liveness(&mut self, slot: usize, alive: bool) {
        lock_sink(self).on_liveness(slot, alive);
    }
    fn on_sweep_end(&mut self) {
        lock_sink(self).on_sweep_end();
    }
    fn on_reset(&mut self) {
        lock_sink(self).on_reset();
    }
    fn on_desync(&mut self, run: u32) {
        lock_sink(self).on_desync(run);
    }
    fn on_capacity_exceeded(&mut self, node_id: u32) {
        lock_sink(self).on_capacity_exceeded(node_id);
    }
}

/// A validated, strictly positive timer period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInterval(Duration);

impl TickInterval {
    pub fn from_millis(ms: i64) -> Result<Self> {
        if ms <= 0 {
            return Err(NodewatchError::InvalidInterval(ms));
        }
        Ok(Self(Duration::from_millis(ms as u64)))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub registry_capacity: usize,
    pub framing: FramingMode,
    pub desync_threshold: u32,
    /// Log every received chunk in hex at debug level.
    pub log_traffic: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            registry_capacity: DEFAULT_CAPACITY,
            framing: FramingMode::Fixed,
            desync_threshold: DEFAULT_DESYNC_THRESHOLD,
            log_traffic: false,
        }
    }
}

/// What one delivered chunk produced.
#[derive(Debug, Default)]
pub struct ChunkSummary {
    /// Valid frames cut from the stream (including any whose node was rejected).
    pub frames: usize,
    /// Malformed frames dropped while processing this chunk.
    pub dropped: u64,
    /// Desync warnings raised while processing this chunk.
    pub desyncs: usize,
    /// Registry failures for frames in this chunk, in stream order.
    pub rejected: Vec<RegistryError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub reassembly: ReassemblyStats,
    pub pending_bytes: usize,
    pub nodes: usize,
    pub capacity: usize,
}

pub struct Monitor<S> {
    reassembler: FrameReassembler,
    registry: NodeRegistry,
    sink: S,
    log_traffic: bool,
}

impl<S: NodeSink> Monitor<S> {
    pub fn new(options: MonitorOptions, sink: S) -> Self {
        Self {
            reassembler: FrameReassembler::with_options(options.framing, options.desync_threshold),
            registry: NodeRegistry::with_capacity(options.registry_capacity),
            sink,
            log_traffic: options.log_traffic,
        }
    }

    /// Feed raw link bytes; every completed valid frame is observed and forwarded to the sink.
    pub fn deliver_chunk(&mut self, chunk: &[u8]) -> ChunkSummary {
        if self.log_traffic {
            debug!("RX {} bytes: {}", chunk.len(), hex_preview(chunk, 64));
            trace!("RX raw: {}", to_hex_string(chunk));
        }
        let dropped_before = self.reassembler.stats().frames_dropped;
        let events = self.reassembler.ingest_events(chunk);
        let dropped = self.reassembler.stats().frames_dropped - dropped_before;

        metrics::add_bytes_ingested(chunk.len());
        metrics::add_frames_dropped(dropped);

        let mut summary = ChunkSummary {
            dropped,
            ..Default::default()
        };
        for event in &events {
            match event {
                LinkEvent::Frame(frame) => {
                    summary.frames += 1;
                    if let Err(e) = self.observe_frame(frame) {
                        summary.rejected.push(e);
                    }
                }
                LinkEvent::Desync(run) => {
                    summary.desyncs += 1;
                    metrics::inc_desync_warnings();
                    self.sink.on_desync(*run);
                }
            }
        }
        metrics::add_frames_accepted(summary.frames);
        summary
    }

    fn observe_frame(&mut self, frame: &Frame) -> std::result::Result<(), RegistryError> {
        let update = FrameUpdate::from(frame);
        match self.registry.observe(update.node_id) {
            Ok(obs) => {
                if obs.is_new {
                    metrics::inc_nodes_registered();
                    self.sink.on_new_node(obs.slot, update.node_id);
                }
                self.sink.on_frame(obs.slot, &update);
                Ok(())
            }
            Err(e) => {
                metrics::inc_capacity_rejections();
                self.sink.on_capacity_exceeded(update.node_id);
                Err(e)
            }
        }
    }

    /// Run one liveness sweep and report it to the sink.
    pub fn tick(&mut self) -> Vec<Liveness> {
        let reports = self.registry.sweep();
        for report in &reports {
            self.sink.on_liveness(report.slot, report.alive);
        }
        self.sink.on_sweep_end();
        metrics::inc_sweeps();
        reports
    }

    /// Forget every node. Bytes waiting in the accumulator are kept.
    pub fn reset(&mut self) {
        info!("clearing {} tracked nodes", self.registry.depth());
        self.registry.clear();
        self.sink.on_reset();
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            reassembly: self.reassembler.stats(),
            pending_bytes: self.reassembler.pending(),
            nodes: self.registry.depth(),
            capacity: self.registry.capacity(),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn reassembler(&self) -> &FrameReassembler {
        &self.reassembler
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
