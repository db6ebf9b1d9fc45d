//! Incremental reassembler turning arbitrary serial chunks into 11-byte frames.
//!
//! Chunks arrive with no relation to frame boundaries: a read may hold zero, one,
//! or many frames and may stop mid-frame. Bytes are appended to an accumulator and
//! whole frames are cut from its front; any tail shorter than [`FRAME_SIZE`] waits
//! for the next chunk.
//!
//! In the default [`FramingMode::Fixed`] mode the cut always advances by exactly one
//! frame, valid or not. A single stray byte therefore misaligns every following
//! frame until the total garbage length is again a multiple of [`FRAME_SIZE`]. The
//! reassembler does not hide this; it counts the rejected windows and raises a
//! desync warning once a run of consecutive rejections reaches the configured
//! threshold. [`FramingMode::Resync`] is the opt-in alternative that skips ahead to
//! the next start marker after a rejection.
use bytes::{Buf, BytesMut};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::frame::{Frame, MalformedFrame, FRAME_SIZE, START_MARKER};

/// Default number of consecutive rejected frames that counts as a desync.
pub const DEFAULT_DESYNC_THRESHOLD: u32 = 4;

/// How the reassembler advances past a rejected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    /// Always advance exactly one frame.
    #[default]
    Fixed,
    /// Drop bytes up to the next start marker after a rejected frame.
    Resync,
}

/// Per-instance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReassemblyStats {
    pub bytes_ingested: u64,
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub bad_start: u64,
    pub bad_end: u64,
    pub zero_node: u64,
    /// Bytes discarded by resync scanning (always 0 in fixed mode).
    pub bytes_skipped: u64,
    pub desync_warnings: u64,
}

impl ReassemblyStats {
    fn record_drop(&mut self, reason: MalformedFrame) {
        self.frames_dropped += 1;
        match reason {
            MalformedFrame::BadStart(_) => self.bad_start += 1,
            MalformedFrame::BadEnd(_) => self.bad_end += 1,
            MalformedFrame::ZeroNode => self.zero_node += 1,
            MalformedFrame::Truncated(_) => {}
        }
    }
}

/// One step of reassembly, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(Frame),
    /// A run of consecutive rejected frames reached the desync threshold.
    Desync(u32),
}

pub struct FrameReassembler {
    buf: BytesMut,
    mode: FramingMode,
    desync_threshold: u32,
    invalid_run: u32,
    desync_reported: bool,
    pending_desync: Vec<u32>,
    stats: ReassemblyStats,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::with_options(FramingMode::Fixed, DEFAULT_DESYNC_THRESHOLD)
    }

    /// A `desync_threshold` of 0 disables desync warnings.
    pub fn with_options(mode: FramingMode, desync_threshold: u32) -> Self {
        Self {
            buf: BytesMut::with_capacity(FRAME_SIZE * 8),
            mode,
            desync_threshold,
            invalid_run: 0,
            desync_reported: false,
            pending_desync: Vec::new(),
            stats: ReassemblyStats::default(),
        }
    }

    /// Append a chunk and return every complete valid frame it finishes, in order.
    ///
    /// Rejected windows are consumed and counted, never returned. Desync warnings
    /// raised along the way are queued for [`FrameReassembler::take_desync`].
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for event in self.ingest_events(chunk) {
            match event {
                LinkEvent::Frame(frame) => frames.push(frame),
                LinkEvent::Desync(run) => self.pending_desync.push(run),
            }
        }
        frames
    }

    /// Like [`FrameReassembler::ingest`] but with desync warnings interleaved with the
    /// frames at the point in the stream where they were raised. Nothing is queued.
    pub fn ingest_events(&mut self, chunk: &[u8]) -> Vec<LinkEvent> {
        self.buf.extend_from_slice(chunk);
        self.stats.bytes_ingested += chunk.len() as u64;

        let mut events = Vec::new();
        while self.buf.len() >= FRAME_SIZE {
            match Frame::parse(&self.buf[..FRAME_SIZE]) {
                Ok(frame) => {
                    self.buf.advance(FRAME_SIZE);
                    self.stats.frames_accepted += 1;
                    self.invalid_run = 0;
                    self.desync_reported = false;
                    events.push(LinkEvent::Frame(frame));
                }
                Err(reason) => {
                    debug!("dropping frame: {}", reason);
                    self.stats.record_drop(reason);
                    self.advance_past_rejected();
                    if let Some(run) = self.note_invalid() {
                        events.push(LinkEvent::Desync(run));
                    }
                }
            }
        }
        events
    }

    fn advance_past_rejected(&mut self) {
        match self.mode {
            FramingMode::Fixed => self.buf.advance(FRAME_SIZE),
            FramingMode::Resync => {
                let skip = self.buf[1..]
                    .iter()
                    .position(|&b| b == START_MARKER)
                    .map(|pos| pos + 1)
                    .unwrap_or(self.buf.len());
                self.buf.advance(skip);
                self.stats.bytes_skipped += skip as u64;
            }
        }
    }

    fn note_invalid(&mut self) -> Option<u32> {
        self.invalid_run = self.invalid_run.saturating_add(1);
        if self.desync_threshold == 0
            || self.desync_reported
            || self.invalid_run < self.desync_threshold
        {
            return None;
        }
        warn!(
            "link likely desynchronized: {} consecutive malformed frames",
            self.invalid_run
        );
        self.desync_reported = true;
        self.stats.desync_warnings += 1;
        Some(self.invalid_run)
    }

    /// Run lengths of the desync warnings raised by [`FrameReassembler::ingest`]
    /// since the last call, oldest first.
    pub fn take_desync(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.pending_desync)
    }

    /// Consecutive rejected frames since the last valid one.
    pub fn invalid_run(&self) -> u32 {
        self.invalid_run
    }

    /// Bytes waiting to complete the next frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn pending_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Discard buffered bytes and the current rejection run (e.g. when the port is reopened).
    /// Counters are kept.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.invalid_run = 0;
        self.desync_reported = false;
        self.pending_desync.clear();
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(node: u8, seq: u8) -> [u8; FRAME_SIZE] {
        Frame::encode(1, node, seq, [seq, seq, seq, seq])
    }

    #[test]
    fn single_complete_frame() {
        let mut r = FrameReassembler::new();
        let frames = r.ingest(&frame_bytes(5, 1));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].node_id(), 5);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn partial_frame_is_carried_over() {
        let mut r = FrameReassembler::new();
        let bytes = frame_bytes(5, 1);
        assert!(r.ingest(&bytes[..7]).is_empty());
        assert_eq!(r.pending(), 7);
        assert_eq!(r.pending_bytes(), &bytes[..7]);

        let frames = r.ingest(&bytes[7..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &bytes);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn many_frames_plus_tail_in_one_chunk() {
        let mut r = FrameReassembler::new();
        let mut data = Vec::new();
        for seq in 0..3 {
            data.extend_from_slice(&frame_bytes(9, seq));
        }
        data.extend_from_slice(&frame_bytes(9, 3)[..4]);

        let frames = r.ingest(&data);
        assert_eq!(frames.iter().map(|f| f.seq()).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(r.pending(), 4);
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut r = FrameReassembler::new();
        assert!(r.ingest(&[]).is_empty());
        assert_eq!(r.stats(), ReassemblyStats::default());
    }

    #[test]
    fn invalid_frames_are_counted_by_reason() {
        let mut r = FrameReassembler::new();
        let mut zero = frame_bytes(0, 0);
        zero[2] = 0;
        let mut bad_end = frame_bytes(3, 0);
        bad_end[10] = 0xFF;
        let mut data = zero.to_vec();
        data.extend_from_slice(&bad_end);
        data.extend_from_slice(&frame_bytes(4, 0));

        let frames = r.ingest(&data);
        assert_eq!(frames.len(), 1);
        let stats = r.stats();
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.zero_node, 1);
        assert_eq!(stats.bad_end, 1);
        assert_eq!(stats.frames_accepted, 1);
        assert_eq!(stats.bytes_ingested, 33);
    }

    #[test]
    fn desync_warning_fires_once_per_run() {
        let mut r = FrameReassembler::with_options(FramingMode::Fixed, 2);
        let garbage = [0xAAu8; FRAME_SIZE * 3];
        r.ingest(&garbage);
        assert_eq!(r.take_desync(), vec![2]);
        assert!(r.take_desync().is_empty());
        assert_eq!(r.invalid_run(), 3);
        assert_eq!(r.stats().desync_warnings, 1);

        // a valid frame ends the run; the next run warns again
        r.ingest(&frame_bytes(1, 1));
        assert_eq!(r.invalid_run(), 0);
        r.ingest(&garbage);
        assert_eq!(r.take_desync(), vec![2]);
        assert_eq!(r.stats().desync_warnings, 2);
    }

    #[test]
    fn two_runs_in_one_chunk_are_both_reported() {
        let mut data = vec![0u8; FRAME_SIZE * 2];
        data.extend_from_slice(&frame_bytes(5, 1));
        data.extend_from_slice(&[0u8; FRAME_SIZE * 2]);

        let mut queued = FrameReassembler::with_options(FramingMode::Fixed, 2);
        assert_eq!(queued.ingest(&data).len(), 1);
        assert_eq!(queued.take_desync(), vec![2, 2]);
        assert_eq!(queued.stats().desync_warnings, 2);

        let mut ordered = FrameReassembler::with_options(FramingMode::Fixed, 2);
        let events = ordered.ingest_events(&data);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], LinkEvent::Desync(2));
        assert!(matches!(events[1], LinkEvent::Frame(f) if f.node_id() == 5));
        assert_eq!(events[2], LinkEvent::Desync(2));
        assert!(ordered.take_desync().is_empty());
    }

    #[test]
    fn zero_threshold_disables_desync_warnings() {
        let mut r = FrameReassembler::with_options(FramingMode::Fixed, 0);
        r.ingest(&[0u8; FRAME_SIZE * 10]);
        assert!(r.take_desync().is_empty());
        assert_eq!(r.stats().frames_dropped, 10);
    }

    #[test]
    fn resync_mode_recovers_after_a_stray_byte() {
        let mut r = FrameReassembler::with_options(FramingMode::Resync, 4);
        let mut data = vec![0x55];
        for seq in 0..3 {
            data.extend_from_slice(&frame_bytes(7, seq));
        }
        let frames = r.ingest(&data);
        assert_eq!(frames.len(), 3);
        assert_eq!(r.stats().frames_dropped, 1);
        assert_eq!(r.stats().bytes_skipped, 1);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn resync_mode_drops_everything_without_a_start_marker() {
        let mut r = FrameReassembler::with_options(FramingMode::Resync, 4);
        assert!(r.ingest(&[0x11; 20]).is_empty());
        assert_eq!(r.pending(), 0);
        assert_eq!(r.stats().bytes_skipped, 20);
    }

    #[test]
    fn clear_keeps_counters() {
        let mut r = FrameReassembler::new();
        r.ingest(&frame_bytes(2, 2));
        r.ingest(&[0x02, 0x01]);
        r.clear();
        assert_eq!(r.pending(), 0);
        assert_eq!(r.stats().frames_accepted, 1);
    }
}
