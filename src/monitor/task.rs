//! Single-owner monitor task.
//!
//! The serial reader, the periodic sweep timer, and user actions all reach the
//! monitor from different places. Instead of sharing it behind a lock, one tokio
//! task owns the [`Monitor`] and applies [`MonitorCommand`]s strictly in arrival
//! order. The periodic sweep runs inside the same loop, so a sweep never interleaves
//! with a half-processed chunk.
//!
//! The command queue is bounded: when chunks arrive faster than they are processed,
//! [`MonitorHandle::deliver_chunk`] waits for room instead of growing memory without
//! limit. At serial line rates the queue normally stays empty.

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::{Monitor, MonitorOptions, MonitorStats, NodeSink, TickInterval};
use crate::error::{NodewatchError, Result};

pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct MonitorTaskConfig {
    pub options: MonitorOptions,
    /// Start sweeping immediately with this period; `None` waits for `start_sweep`.
    pub sweep_interval: Option<TickInterval>,
    pub queue_depth: usize,
}

impl Default for MonitorTaskConfig {
    fn default() -> Self {
        Self {
            options: MonitorOptions::default(),
            sweep_interval: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

pub enum MonitorCommand {
    Chunk(Vec<u8>),
    Tick,
    Reset,
    StartSweep(TickInterval),
    StopSweep,
    Snapshot(oneshot::Sender<MonitorStats>),
    Shutdown(oneshot::Sender<MonitorStats>),
}

#[derive(Clone, Debug)]
pub struct MonitorHandle {
    tx: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    async fn send(&self, cmd: MonitorCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| NodewatchError::MonitorStopped)
    }

    pub async fn deliver_chunk(&self, chunk: Vec<u8>) -> Result<()> {
        self.send(MonitorCommand::Chunk(chunk)).await
    }

    /// Deliver from a plain thread (e.g. a blocking serial reader).
    ///
    /// Must not be called from inside the async runtime.
    pub fn blocking_deliver_chunk(&self, chunk: Vec<u8>) -> Result<()> {
        self.tx
            .blocking_send(MonitorCommand::Chunk(chunk))
            .map_err(|_| NodewatchError::MonitorStopped)
    }

    /// Run one sweep now, independent of the periodic timer.
    pub async fn tick(&self) -> Result<()> {
        self.send(MonitorCommand::Tick).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(MonitorCommand::Reset).await
    }

    /// Start (or restart with a new period) the periodic sweep.
    pub async fn start_sweep(&self, interval: TickInterval) -> Result<()> {
        self.send(MonitorCommand::StartSweep(interval)).await
    }

    pub async fn stop_sweep(&self) -> Result<()> {
        self.send(MonitorCommand::StopSweep).await
    }

    pub async fn snapshot(&self) -> Result<MonitorStats> {
        let (tx, rx) = oneshot::channel();
        self.send(MonitorCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| NodewatchError::MonitorStopped)
    }

    /// Stop the task after every command queued before this one has been applied.
    pub async fn shutdown(&self) -> Result<MonitorStats> {
        let (tx, rx) = oneshot::channel();
        self.send(MonitorCommand::Shutdown(tx)).await?;
        rx.await.map_err(|_| NodewatchError::MonitorStopped)
    }
}

fn sweep_timer(period: TickInterval) -> Interval {
    let period = period.as_duration();
    // first sweep one full period from now, not immediately
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_sweep(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Spawn the monitor task on the current tokio runtime.
pub fn start_monitor<S>(cfg: MonitorTaskConfig, sink: S) -> MonitorHandle
where
    S: NodeSink + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<MonitorCommand>(cfg.queue_depth.max(1));
    let handle = MonitorHandle { tx };

    tokio::spawn(async move {
        let mut monitor = Monitor::new(cfg.options, sink);
        let mut sweep = cfg.sweep_interval.map(sweep_timer);
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(MonitorCommand::Chunk(chunk)) => {
                            let summary = monitor.deliver_chunk(&chunk);
                            for err in summary.rejected {
                                debug!("frame not tracked: {}", err);
                            }
                        }
                        Some(MonitorCommand::Tick) => { monitor.tick(); }
                        Some(MonitorCommand::Reset) => monitor.reset(),
                        Some(MonitorCommand::StartSweep(period)) => {
                            info!("node sweep every {:?}", period.as_duration());
                            sweep = Some(sweep_timer(period));
                        }
                        Some(MonitorCommand::StopSweep) => {
                            info!("node sweep stopped");
                            sweep = None;
                        }
                        Some(MonitorCommand::Snapshot(resp)) => { let _ = resp.send(monitor.stats()); }
                        Some(MonitorCommand::Shutdown(done)) => {
                            let _ = done.send(monitor.stats());
                            break;
                        }
                        None => {
                            warn!("all monitor handles dropped, stopping");
                            break;
                        }
                    }
                }
                _ = next_sweep(&mut sweep) => { monitor.tick(); }
            }
        }
        debug!("monitor loop terminated");
    });

    handle
}
