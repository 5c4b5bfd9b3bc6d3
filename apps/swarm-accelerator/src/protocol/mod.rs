//! Chunk upload wire protocol
//!
//! Shared by the one-shot bulk endpoint and the duplex stream endpoint.

pub mod frame;

pub use frame::{
    encode_frame, Frame, FrameDecoder, FrameLayout, Frames, ProtocolError, DEFAULT_MAX_BUFFER,
    MAX_FRAME_SIZE,
};

/// Acknowledgement sent after each chunk stored from a stream
pub const ACK: &[u8; 3] = b"ack";
