//! # Nodewatch - Serial Link Node Monitor
//!
//! Nodewatch listens on a serial link carrying fixed 11-byte STX/ETX frames,
//! reassembles them from arbitrarily split reads, and keeps a table of the remote
//! nodes that send them: each node gets a stable display slot in first-seen order
//! and is periodically swept for liveness.
//!
//! ## Features
//!
//! - **Stream Reassembly**: Frames are cut from a persistent accumulator regardless of how reads split them.
//! - **Drop Accounting**: Malformed frames are dropped and counted; long runs raise a desync warning.
//! - **Node Registry**: Bounded, first-seen-ordered slots with edge-triggered liveness sweeps.
//! - **Single-Owner Task**: Link chunks, sweeps and resets are serialized through one bounded queue.
//! - **Serial I/O**: Direct port access, text/hex sends and a periodic value-up counter (`serial` feature).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nodewatch::config::Config;
//! use nodewatch::monitor::start_monitor;
//! use nodewatch::nodes::NodeTable;
//! use std::sync::{Arc, Mutex};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("nodewatch.toml").await?;
//!     config.validate()?;
//!
//!     let table = Arc::new(Mutex::new(NodeTable::new()));
//!     let monitor = start_monitor(config.monitor.task_config()?, table.clone());
//!     monitor.deliver_chunk(vec![0x02, 1, 31, 0, 0, 0, 0, 0, 0, 0, 0x03]).await?;
//!     monitor.tick().await?;
//!     monitor.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`link`] - Frame format, reassembler, hex helpers
//! - [`nodes`] - Node registry and the node table model
//! - [`monitor`] - Monitor core, sink trait and the monitor task
//! - [`device`] - Serial port access, sends and the value-up counter
//! - [`config`] - Configuration management and validation
//! - [`metrics`] - Process-wide counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Serial Reader  │ ← Raw chunks, any size
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Monitor Task   │ ← Serializes chunks, sweeps, resets
//! │  ┌───────────┐  │
//! │  │Reassembler│  │
//! │  ├───────────┤  │
//! │  │ Registry  │  │
//! │  └───────────┘  │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    NodeSink     │ ← Presentation
//! └─────────────────┘
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod link;
pub mod metrics;
pub mod monitor;
pub mod nodes;

pub use error::{NodewatchError, Result};
