//! # Link Layer
//!
//! Everything between raw serial bytes and decoded frames:
//!
//! - [`frame`] - the fixed 11-byte STX/ETX frame and its validation rules
//! - [`reassembler`] - incremental chunk-to-frame reassembly with drop accounting
//! - [`hex`] - hex rendering for traffic logs and parsing for user send data
//!
//! ```rust
//! use nodewatch::link::{Frame, FrameReassembler};
//!
//! let mut reassembler = FrameReassembler::new();
//! let wire = Frame::encode(1, 31, 0, [0, 1, 0, 1]);
//!
//! assert!(reassembler.ingest(&wire[..5]).is_empty());
//! let frames = reassembler.ingest(&wire[5..]);
//! assert_eq!(frames[0].node_id(), 31);
//! ```

pub mod frame;
pub mod hex;
pub mod reassembler;

pub use frame::{Frame, MalformedFrame, END_MARKER, FRAME_SIZE, START_MARKER};
pub use hex::{hex_preview, parse_hex, to_hex_string, HexError};
pub use reassembler::{
    FrameReassembler, FramingMode, LinkEvent, ReassemblyStats, DEFAULT_DESYNC_THRESHOLD,
};
