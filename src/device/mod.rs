//! # Serial Device
//!
//! Physical side of the link: opening the port with the configured line settings,
//! a blocking reader thread that forwards every read into the monitor task, one-shot
//! sends in text or hex mode, and the [`counter`] transmitter.
//!
//! Port access needs the `serial` feature (on by default). Without it only the pure
//! helpers ([`order_port_names`], [`send_data`], [`raise_control_lines`]) are available.
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # async fn demo() -> anyhow::Result<()> {
//! use nodewatch::config::Config;
//! use nodewatch::device;
//! use nodewatch::monitor::{start_monitor, NullSink};
//!
//! let config = Config::load("nodewatch.toml").await?;
//! let monitor = start_monitor(config.monitor.task_config()?, NullSink);
//! let port = device::open_port(&config.serial)?;
//! let reader = device::spawn_reader(port, monitor.clone());
//! // ...
//! reader.stop();
//! # Ok(())
//! # }
//! ```

pub mod counter;

use std::fmt;
use std::io::Write;

use log::{debug, warn};

use crate::error::Result;
use crate::link::{parse_hex, to_hex_string};

#[cfg(feature = "serial")]
pub use serial::{list_ports, open_port, read_pins, spawn_reader, ReaderHandle};

/// How user-entered send data is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataMode {
    /// Bytes of the string as typed.
    #[default]
    Text,
    /// Pairs of hex digits, whitespace ignored.
    Hex,
}

/// Write `data` to the port once. Returns the bytes that went out.
pub fn send_data<W: Write + ?Sized>(port: &mut W, data: &str, mode: DataMode) -> Result<Vec<u8>> {
    let bytes = match mode {
        DataMode::Text => data.as_bytes().to_vec(),
        DataMode::Hex => parse_hex(data)?,
    };
    port.write_all(&bytes)?;
    port.flush()?;
    debug!("TX {} bytes: {}", bytes.len(), to_hex_string(&bytes));
    Ok(bytes)
}

/// Modem status inputs as last read from the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinState {
    pub cts: bool,
    pub dsr: bool,
    pub cd: bool,
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = |on: bool| if on { "on" } else { "off" };
        write!(
            f,
            "CTS={} DSR={} CD={}",
            level(self.cts),
            level(self.dsr),
            level(self.cd)
        )
    }
}

/// Output control lines a port can drive.
pub trait ControlLines {
    fn set_dtr(&mut self, level: bool) -> std::io::Result<()>;
    fn set_rts(&mut self, level: bool) -> std::io::Result<()>;
}

/// Raise DTR and/or RTS as requested. A line that cannot be set is logged and
/// named in the result; the port stays usable.
pub fn raise_control_lines<P: ControlLines + ?Sized>(
    port: &mut P,
    dtr: bool,
    rts: bool,
) -> Vec<&'static str> {
    let mut failed = Vec::new();
    if dtr {
        if let Err(e) = port.set_dtr(true) {
            warn!("could not assert DTR: {}", e);
            failed.push("DTR");
        }
    }
    if rts {
        if let Err(e) = port.set_rts(true) {
            warn!("could not assert RTS: {}", e);
            failed.push("RTS");
        }
    }
    failed
}

/// Order port names for display: names ending in a number sort by that number
/// (`COM2` before `COM10`); names without one keep their relative order and sort
/// first.
pub fn order_port_names(mut names: Vec<String>) -> Vec<String> {
    names.sort_by_key(|name| trailing_number(name).unwrap_or(0));
    names
}

fn trailing_number(name: &str) -> Option<u64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

#[cfg(feature = "serial")]
mod serial {
    use std::io::{ErrorKind, Read};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use log::{debug, info, warn};
    use serialport::SerialPort;

    use super::{order_port_names, raise_control_lines, ControlLines, PinState};
    use crate::config::{Parity, SerialConfig};
    use crate::error::{NodewatchError, Result};
    use crate::monitor::MonitorHandle;

    /// Names of the serial ports the OS currently reports, in display order.
    pub fn list_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()
            .map_err(|e| NodewatchError::Serial(format!("cannot enumerate ports: {}", e)))?;
        Ok(order_port_names(
            ports.into_iter().map(|p| p.port_name).collect(),
        ))
    }

    pub fn open_port(cfg: &SerialConfig) -> Result<Box<dyn SerialPort>> {
        debug!(
            "Opening serial port {} at {} baud ({}{}{})",
            cfg.port,
            cfg.baud_rate,
            cfg.data_bits,
            match cfg.parity {
                Parity::None => 'N',
                Parity::Odd => 'O',
                Parity::Even => 'E',
            },
            cfg.stop_bits
        );
        let data_bits = match cfg.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let parity = match cfg.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        };
        let stop_bits = match cfg.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };
        let mut port = serialport::new(&cfg.port, cfg.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(cfg.read_timeout_ms.max(1)))
            .open()
            .map_err(|e| {
                NodewatchError::Serial(format!("Failed to open serial port {}: {}", cfg.port, e))
            })?;
        raise_control_lines(&mut port, cfg.dtr, cfg.rts);
        Ok(port)
    }

    impl ControlLines for Box<dyn SerialPort> {
        fn set_dtr(&mut self, level: bool) -> std::io::Result<()> {
            self.write_data_terminal_ready(level).map_err(Into::into)
        }
        fn set_rts(&mut self, level: bool) -> std::io::Result<()> {
            self.write_request_to_send(level).map_err(Into::into)
        }
    }

    /// Read CTS, DSR and CD.
    pub fn read_pins(port: &mut dyn SerialPort) -> Result<PinState> {
        let read =
            |e: serialport::Error| NodewatchError::Serial(format!("cannot read modem lines: {}", e));
        Ok(PinState {
            cts: port.read_clear_to_send().map_err(read)?,
            dsr: port.read_data_set_ready().map_err(read)?,
            cd: port.read_carrier_detect().map_err(read)?,
        })
    }

    pub struct ReaderHandle {
        stop: Arc<AtomicBool>,
        thread: JoinHandle<()>,
    }

    impl ReaderHandle {
        /// Ask the reader to exit after its current read and wait for it.
        pub fn stop(self) {
            self.stop.store(true, Ordering::Relaxed);
            let _ = self.thread.join();
        }

        pub fn is_finished(&self) -> bool {
            self.thread.is_finished()
        }
    }

    /// Read the port on a dedicated thread and push every chunk into the monitor.
    ///
    /// Changes of the modem status lines are logged as they are seen. The thread ends
    /// when stopped, when the monitor goes away, or when the port reports that it is
    /// gone.
    pub fn spawn_reader(mut port: Box<dyn SerialPort>, monitor: MonitorHandle) -> ReaderHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let name = port.name().unwrap_or_else(|| "serial".to_string());
        let thread = thread::spawn(move || {
            info!("reader started on {}", name);
            let mut buf = [0u8; 1024];
            let mut pins: Option<PinState> = None;
            while !stop_flag.load(Ordering::Relaxed) {
                if let Ok(now) = read_pins(&mut *port) {
                    if pins != Some(now) {
                        info!("{} modem lines: {}", name, now);
                        pins = Some(now);
                    }
                }
                match port.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        if monitor.blocking_deliver_chunk(buf[..n].to_vec()).is_err() {
                            debug!("monitor stopped, reader exiting");
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => {
                        debug!("reader interrupted (EINTR)");
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::NotFound
                        ) =>
                    {
                        warn!("serial port {} closed: {}", name, e);
                        break;
                    }
                    Err(e) => {
                        warn!("serial read error (continuing): {}", e);
                        thread::sleep(Duration::from_millis(50));
                    }
                }
            }
            info!("reader on {} stopped", name);
        });
        ReaderHandle { stop, thread }
    }
}
