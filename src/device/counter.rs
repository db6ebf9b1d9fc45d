//! "Value up" transmitter: periodically writes an incrementing six-digit counter.
//!
//! Each tick writes the current value as zero-padded ASCII (`000042`) and then
//! increments it, wrapping after `999999`. A failed write stops the transmitter,
//! which is what happens when the port goes away underneath it.
use std::io::Write;

use log::{info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::monitor::TickInterval;

const WRAP: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueCounter {
    value: u32,
}

impl ValueCounter {
    pub fn new(start: u32) -> Self {
        Self {
            value: start % WRAP,
        }
    }

    /// The value the next payload will carry.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Current value as a six-digit payload; advances the counter.
    pub fn next_payload(&mut self) -> String {
        let payload = format!("{:06}", self.value);
        self.value = (self.value + 1) % WRAP;
        payload
    }
}

pub struct CounterHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<ValueCounter>,
}

impl CounterHandle {
    /// Stop transmitting and return the counter, positioned at the next unsent value.
    pub async fn stop(mut self) -> Option<ValueCounter> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the transmitter on the current tokio runtime. The first write happens one
/// `interval` after the call.
pub fn spawn_counter<W>(mut writer: W, start: u32, interval: TickInterval) -> CounterHandle
where
    W: Write + Send + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let period = interval.as_duration();
    let task = tokio::spawn(async move {
        let mut counter = ValueCounter::new(start);
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "value-up counter started at {:06}, every {:?}",
            counter.value(),
            period
        );
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = timer.tick() => {
                    let payload = counter.next_payload();
                    let written = writer.write_all(payload.as_bytes()).and_then(|_| writer.flush());
                    if let Err(e) = written {
                        warn!("value-up write failed, stopping counter: {}", e);
                        break;
                    }
                    info!("TX {}", payload);
                }
            }
        }
        counter
    });
    CounterHandle {
        stop: Some(stop_tx),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPort;

    impl Write for BrokenPort {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "port closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn payload_is_current_value_then_increments() {
        let mut c = ValueCounter::new(41);
        assert_eq!(c.next_payload(), "000041");
        assert_eq!(c.next_payload(), "000042");
        assert_eq!(c.value(), 43);
    }

    #[test]
    fn wraps_after_six_digits() {
        let mut c = ValueCounter::new(999_999);
        assert_eq!(c.next_payload(), "999999");
        assert_eq!(c.next_payload(), "000000");
        assert_eq!(ValueCounter::new(1_000_005).value(), 5);
    }

    #[tokio::test]
    async fn writes_on_each_tick_until_stopped() {
        let buf = SharedBuf::default();
        let handle = spawn_counter(buf.clone(), 7, TickInterval::from_millis(10).unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;
        let counter = handle.stop().await.expect("task finished cleanly");

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("000007000008"), "got {written}");
        assert_eq!(written.len() % 6, 0);
        assert_eq!(counter.value(), 7 + (written.len() / 6) as u32);
    }

    #[tokio::test]
    async fn write_failure_stops_the_counter() {
        let handle = spawn_counter(BrokenPort, 0, TickInterval::from_millis(5).unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
        let counter = handle.stop().await.unwrap();
        assert_eq!(counter.value(), 1);
    }
}
