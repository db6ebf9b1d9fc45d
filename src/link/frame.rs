//! Fixed-size delimited frames carried on the serial link.
//!
//! Every packet on the wire is exactly [`FRAME_SIZE`] bytes:
//!
//! ```text
//! ┌──────┬───────┬────────┬─────┬─────┬─────┬─────┬─────┬──────────┬──────┐
//! │ 0x02 │ group │ nodeId │ seq │ di1 │ di2 │ di3 │ di4 │ reserved │ 0x03 │
//! │  0   │   1   │   2    │  3  │  4  │  5  │  6  │  7  │   8..9   │  10  │
//! └──────┴───────┴────────┴─────┴─────┴─────┴─────┴─────┴──────────┴──────┘
//! ```
//!
//! The reserved bytes are carried along untouched and never interpreted.
use std::fmt;

use thiserror::Error;

/// Size of one frame on the wire.
pub const FRAME_SIZE: usize = 11;
/// Start-of-frame marker (STX).
pub const START_MARKER: u8 = 0x02;
/// End-of-frame marker (ETX).
pub const END_MARKER: u8 = 0x03;

const GROUP_OFFSET: usize = 1;
const NODE_OFFSET: usize = 2;
const SEQ_OFFSET: usize = 3;
const INPUTS_OFFSET: usize = 4;
const END_OFFSET: usize = FRAME_SIZE - 1;

/// Why a candidate frame was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MalformedFrame {
    #[error("start marker 0x{0:02X} (expected 0x02)")]
    BadStart(u8),
    #[error("end marker 0x{0:02X} (expected 0x03)")]
    BadEnd(u8),
    #[error("node id is zero")]
    ZeroNode,
    #[error("only {0} of 11 bytes")]
    Truncated(usize),
}

/// A validated 11-byte frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    raw: [u8; FRAME_SIZE],
}

impl Frame {
    /// Validate a candidate window taken from the accumulator.
    ///
    /// Only the first [`FRAME_SIZE`] bytes of `window` are considered.
    pub fn parse(window: &[u8]) -> Result<Self, MalformedFrame> {
        if window.len() < FRAME_SIZE {
            return Err(MalformedFrame::Truncated(window.len()));
        }
        let mut raw = [0u8; FRAME_SIZE];
        raw.copy_from_slice(&window[..FRAME_SIZE]);
        if raw[0] != START_MARKER {
            return Err(MalformedFrame::BadStart(raw[0]));
        }
        if raw[END_OFFSET] != END_MARKER {
            return Err(MalformedFrame::BadEnd(raw[END_OFFSET]));
        }
        if raw[NODE_OFFSET] == 0 {
            return Err(MalformedFrame::ZeroNode);
        }
        Ok(Self { raw })
    }

    /// Build a well-formed frame. Reserved bytes are zeroed.
    ///
    /// A zero `node_id` still encodes but will be rejected by [`Frame::parse`].
    pub fn encode(group: u8, node_id: u8, seq: u8, inputs: [u8; 4]) -> [u8; FRAME_SIZE] {
        let mut raw = [0u8; FRAME_SIZE];
        raw[0] = START_MARKER;
        raw[GROUP_OFFSET] = group;
        raw[NODE_OFFSET] = node_id;
        raw[SEQ_OFFSET] = seq;
        raw[INPUTS_OFFSET..INPUTS_OFFSET + 4].copy_from_slice(&inputs);
        raw[END_OFFSET] = END_MARKER;
        raw
    }

    pub fn group(&self) -> u8 {
        self.raw[GROUP_OFFSET]
    }

    pub fn node_id(&self) -> u8 {
        self.raw[NODE_OFFSET]
    }

    pub fn seq(&self) -> u8 {
        self.raw[SEQ_OFFSET]
    }

    /// The four data-input values (DI1..DI4).
    pub fn inputs(&self) -> [u8; 4] {
        let mut di = [0u8; 4];
        di.copy_from_slice(&self.raw[INPUTS_OFFSET..INPUTS_OFFSET + 4]);
        di
    }

    /// Bit-exact bytes as received.
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.raw
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("group", &self.group())
            .field("node_id", &self.node_id())
            .field("seq", &self.seq())
            .field("inputs", &self.inputs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_fields_at_fixed_offsets() {
        let bytes = Frame::encode(7, 31, 200, [1, 2, 3, 4]);
        let frame = Frame::parse(&bytes).expect("valid frame");
        assert_eq!(frame.group(), 7);
        assert_eq!(frame.node_id(), 31);
        assert_eq!(frame.seq(), 200);
        assert_eq!(frame.inputs(), [1, 2, 3, 4]);
        assert_eq!(frame.as_bytes(), &bytes);
    }

    #[test]
    fn reserved_bytes_are_not_validated() {
        let mut bytes = Frame::encode(1, 5, 0, [0; 4]);
        bytes[8] = 0xFF;
        bytes[9] = 0xEE;
        let frame = Frame::parse(&bytes).expect("reserved bytes ignored");
        assert_eq!(frame.as_bytes()[8..10], [0xFF, 0xEE]);
    }

    #[test]
    fn rejects_each_malformation() {
        let mut bad_start = Frame::encode(1, 5, 0, [0; 4]);
        bad_start[0] = 0x7E;
        assert_eq!(Frame::parse(&bad_start), Err(MalformedFrame::BadStart(0x7E)));

        let mut bad_end = Frame::encode(1, 5, 0, [0; 4]);
        bad_end[10] = 0x00;
        assert_eq!(Frame::parse(&bad_end), Err(MalformedFrame::BadEnd(0x00)));

        let zero_node = Frame::encode(1, 0, 0, [0; 4]);
        assert_eq!(Frame::parse(&zero_node), Err(MalformedFrame::ZeroNode));
    }

    #[test]
    fn parse_ignores_bytes_past_the_window() {
        let mut bytes = Frame::encode(2, 9, 1, [9, 9, 9, 9]).to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let frame = Frame::parse(&bytes).expect("valid");
        assert_eq!(frame.node_id(), 9);
    }

    #[test]
    fn short_window_is_an_error() {
        assert_eq!(Frame::parse(&[0x02, 1, 2]), Err(MalformedFrame::Truncated(3)));
        assert_eq!(Frame::parse(&[]), Err(MalformedFrame::Truncated(0)));
    }
}
