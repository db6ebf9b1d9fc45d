//! Binary entrypoint for the nodewatch CLI.
//!
//! Commands:
//! - `init` - write a starter config file
//! - `run [--port <path>] [--sweep-ms <ms>] [--counter]` - monitor a live link
//! - `ports` - list serial ports
//! - `send --port <path> [--hex] <data>` - write data to a port once
//! - `replay <file> [--chunk <n>] [--json]` - feed a captured byte stream through the monitor
//!
//! See the library crate docs for module‑level details: `nodewatch::`.
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;

use nodewatch::config::Config;
use nodewatch::metrics;
use nodewatch::monitor::{FrameUpdate, Monitor, NodeSink};
use nodewatch::nodes::NodeTable;

#[derive(Parser)]
#[command(name = "nodewatch")]
#[command(about = "Serial link node monitor for fixed-size STX/ETX frames")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "nodewatch.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Monitor the serial link until Ctrl-C
    Run {
        /// Serial port (e.g., /dev/ttyUSB0, COM3)
        #[arg(short, long)]
        port: Option<String>,
        /// Node sweep interval in milliseconds
        #[arg(long, allow_negative_numbers = true)]
        sweep_ms: Option<i64>,
        /// Also run the value-up counter transmitter
        #[arg(long)]
        counter: bool,
    },
    /// List available serial ports
    Ports,
    /// Send data to the port once
    Send {
        /// Serial port
        #[arg(short, long)]
        port: Option<String>,
        /// Interpret DATA as hex digits (e.g. "02 1F 03")
        #[arg(long)]
        hex: bool,
        data: String,
    },
    /// Replay a captured byte stream and print the resulting node table
    Replay {
        file: String,
        /// Bytes per delivered chunk
        #[arg(long, default_value_t = 64)]
        chunk: usize,
        /// Sweep after this many chunks (0 = one sweep at the end)
        #[arg(long, default_value_t = 0)]
        sweep_every: usize,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Node table that prints itself after every sweep.
#[cfg_attr(not(feature = "serial"), allow(dead_code))]
#[derive(Default)]
struct ConsoleTable {
    table: NodeTable,
}

impl NodeSink for ConsoleTable {
    fn on_new_node(&mut self, slot: usize, node_id: u32) {
        self.table.on_new_node(slot, node_id);
    }
    fn on_frame(&mut self, slot: usize, update: &FrameUpdate) {
        self.table.on_frame(slot, update);
    }
    fn on_liveness(&mut self, slot: usize, alive: bool) {
        if self.table.row(slot).map(|r| r.alive) != Some(alive) {
            info!("slot {} is now {}", slot, if alive { "alive" } else { "DEAD" });
        }
        self.table.on_liveness(slot, alive);
    }
    fn on_sweep_end(&mut self) {
        println!("{}", self.table.render());
    }
    fn on_reset(&mut self) {
        self.table.on_reset();
    }
    fn on_desync(&mut self, run: u32) {
        self.table.on_desync(run);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Best effort so logging can use the configured level; commands load again and
    // report the error.
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Run {
            port,
            sweep_ms,
            counter,
        } => {
            let mut config = resolve_config(pre_config, &cli.config).await?;
            if let Some(p) = port {
                config.serial.port = p;
            }
            if let Some(ms) = sweep_ms {
                config.monitor.sweep_interval_ms = Some(ms);
            }
            if counter {
                config.counter.enabled = true;
            }
            config.validate()?;
            run_monitor(config).await?;
        }
        Commands::Ports => {
            #[cfg(feature = "serial")]
            {
                let ports = nodewatch::device::list_ports()?;
                if ports.is_empty() {
                    println!("No serial ports detected.");
                }
                for p in ports {
                    println!("{}", p);
                }
            }
            #[cfg(not(feature = "serial"))]
            return Err(anyhow!("listing ports requires the 'serial' feature"));
        }
        Commands::Send { port, hex, data } => {
            #[cfg(feature = "serial")]
            {
                use nodewatch::device::{self, DataMode};
                let mut config = resolve_config(pre_config, &cli.config).await?;
                if let Some(p) = port {
                    config.serial.port = p;
                }
                config.validate()?;
                let mut dev = device::open_port(&config.serial)?;
                let mode = if hex { DataMode::Hex } else { DataMode::Text };
                let sent = device::send_data(&mut dev, &data, mode)?;
                println!("sent {} bytes", sent.len());
            }
            #[cfg(not(feature = "serial"))]
            {
                let _ = (port, hex, data);
                return Err(anyhow!("sending requires the 'serial' feature"));
            }
        }
        Commands::Replay {
            file,
            chunk,
            sweep_every,
            json,
        } => {
            let config = resolve_config(pre_config, &cli.config).await?;
            config.validate()?;
            replay(&config, &file, chunk, sweep_every, json).await?;
        }
    }

    Ok(())
}

/// Reuse the config loaded for logging, otherwise load it again so that a broken file
/// is reported. Only a missing file falls back to the defaults.
async fn resolve_config(pre_config: Option<Config>, path: &str) -> Result<Config> {
    match pre_config {
        Some(config) => Ok(config),
        None => Config::load_or_default(path).await,
    }
}

async fn replay(
    config: &Config,
    file: &str,
    chunk: usize,
    sweep_every: usize,
    json: bool,
) -> Result<()> {
    if chunk == 0 {
        return Err(anyhow!("--chunk must be at least 1"));
    }
    let data = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow!("Failed to read capture {}: {}", file, e))?;
    let options = config.monitor.task_config()?.options;
    let mut monitor = Monitor::new(options, NodeTable::new());
    for (i, piece) in data.chunks(chunk).enumerate() {
        monitor.deliver_chunk(piece);
        if sweep_every > 0 && (i + 1) % sweep_every == 0 {
            monitor.tick();
        }
    }
    monitor.tick();

    if json {
        let payload = serde_json::json!({
            "stats": monitor.stats(),
            "nodes": monitor.sink().rows(),
            "metrics": metrics::snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let stats = monitor.stats();
        println!("{}", monitor.sink().render());
        println!(
            "{} bytes, {} frames accepted, {} dropped, {} desync warnings, {} bytes pending",
            stats.reassembly.bytes_ingested,
            stats.reassembly.frames_accepted,
            stats.reassembly.frames_dropped,
            stats.reassembly.desync_warnings,
            stats.pending_bytes
        );
    }
    Ok(())
}

#[cfg(feature = "serial")]
async fn run_monitor(config: Config) -> Result<()> {
    use nodewatch::device::{self, counter::spawn_counter};
    use nodewatch::monitor::{start_monitor, TickInterval};

    info!("Starting nodewatch v{}", env!("CARGO_PKG_VERSION"));
    let table = Arc::new(Mutex::new(ConsoleTable::default()));
    let monitor = start_monitor(config.monitor.task_config()?, table.clone());

    let port = device::open_port(&config.serial)?;
    info!(
        "Connected to {} at {} baud",
        config.serial.port, config.serial.baud_rate
    );

    let counter = if config.counter.enabled {
        let writer = port
            .try_clone()
            .map_err(|e| anyhow!("cannot clone port for counter: {}", e))?;
        let interval = TickInterval::from_millis(config.counter.interval_ms)?;
        Some(spawn_counter(writer, config.counter.start, interval))
    } else {
        None
    };

    let reader = device::spawn_reader(port, monitor.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(counter) = counter {
        counter.stop().await;
    }
    let stats = monitor.shutdown().await?;
    tokio::task::spawn_blocking(move || reader.stop()).await?;
    info!(
        "session: {} frames accepted, {} dropped, {} nodes",
        stats.reassembly.frames_accepted, stats.reassembly.frames_dropped, stats.nodes
    );
    Ok(())
}

#[cfg(not(feature = "serial"))]
async fn run_monitor(_config: Config) -> Result<()> {
    Err(anyhow!("the run command requires the 'serial' feature"))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = Arc::new(Mutex::new(f));
        // Only mirror to the console when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
