//! Incremental chunk frame decoder
//!
//! Wire format per frame: `u16 LE size` followed by `size` payload bytes
//! (`span || data`). The one-shot bulk layout appends a 32-byte expected
//! hash to every frame; the streaming layout may be preceded by a single
//! `u16 LE` frame count.
//!
//! Input is fed in arbitrary pieces; frames that straddle feeds are
//! resumed from the decoder's cursor on the next call.

use axum::body::Bytes;

use crate::swarm::{SwarmHash, CHUNK_SIZE, HASH_SIZE};

/// Largest accepted frame payload
pub const MAX_FRAME_SIZE: usize = CHUNK_SIZE;

/// Default per-connection buffer bound (10 MiB)
pub const DEFAULT_MAX_BUFFER: usize = 10 * 1024 * 1024;

const SIZE_PREFIX: usize = std::mem::size_of::<u16>();

/// Framing violations. All of them are fatal for the connection/request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    Oversized { size: usize, max: usize },

    #[error("Frame buffer overflow: {buffered} bytes buffered (max: {max})")]
    BufferOverflow { buffered: usize, max: usize },

    #[error("Input ended inside a frame ({remaining} trailing bytes)")]
    Truncated { remaining: usize },

    #[error("Unexpected data after the declared {0} frames")]
    UnexpectedData(u16),
}

/// Frame layout variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// A `u16 LE` frame count precedes all frames
    pub count_prefix: bool,
    /// Each frame is followed by its 32-byte expected hash
    pub trailing_hash: bool,
}

impl FrameLayout {
    /// Bulk upload request body
    pub const ONE_SHOT: FrameLayout = FrameLayout {
        count_prefix: false,
        trailing_hash: true,
    };

    /// Duplex socket stream
    pub const fn streaming(count_prefix: bool) -> FrameLayout {
        FrameLayout {
            count_prefix,
            trailing_hash: false,
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw `span || data` payload
    pub payload: Bytes,
    /// Client-declared hash (one-shot layout only)
    pub expected_hash: Option<SwarmHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingCount,
    AwaitingSize,
    AwaitingPayload { size: usize },
    Complete,
}

/// Restartable incremental frame parser
#[derive(Debug)]
pub struct FrameDecoder {
    layout: FrameLayout,
    state: DecodeState,
    buffer: Vec<u8>,
    cursor: usize,
    max_buffer: usize,
    declared: Option<u16>,
    remaining: Option<u16>,
    decoded: u64,
}

impl FrameDecoder {
    pub fn new(layout: FrameLayout, max_buffer: usize) -> Self {
        let state = if layout.count_prefix {
            DecodeState::AwaitingCount
        } else {
            DecodeState::AwaitingSize
        };

        Self {
            layout,
            state,
            buffer: Vec::new(),
            cursor: 0,
            max_buffer,
            declared: None,
            remaining: None,
            decoded: 0,
        }
    }

    /// Append transport bytes
    ///
    /// Fails when the unconsumed bytes would exceed the buffer bound, or when
    /// data arrives after a count-prefixed exchange completed.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.is_empty() {
            return Ok(());
        }
        if self.state == DecodeState::Complete {
            return Err(ProtocolError::UnexpectedData(self.declared.unwrap_or(0)));
        }

        self.compact();
        let buffered = self.buffer.len() + data.len();
        if buffered > self.max_buffer {
            return Err(ProtocolError::BufferOverflow {
                buffered,
                max: self.max_buffer,
            });
        }

        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Decode the next complete frame, or `None` if more input is needed
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            match self.state {
                DecodeState::Complete => {
                    if self.available() > 0 {
                        return Err(ProtocolError::UnexpectedData(self.declared.unwrap_or(0)));
                    }
                    return Ok(None);
                }
                DecodeState::AwaitingCount => {
                    let Some(count) = self.take_u16() else {
                        return Ok(None);
                    };
                    self.declared = Some(count);
                    self.remaining = Some(count);
                    self.state = if count == 0 {
                        DecodeState::Complete
                    } else {
                        DecodeState::AwaitingSize
                    };
                }
                DecodeState::AwaitingSize => {
                    let Some(size) = self.take_u16() else {
                        return Ok(None);
                    };
                    let size = usize::from(size);
                    if size > MAX_FRAME_SIZE {
                        return Err(ProtocolError::Oversized {
                            size,
                            max: MAX_FRAME_SIZE,
                        });
                    }
                    self.state = DecodeState::AwaitingPayload { size };
                }
                DecodeState::AwaitingPayload { size } => {
                    let needed = size + if self.layout.trailing_hash { HASH_SIZE } else { 0 };
                    if self.available() < needed {
                        return Ok(None);
                    }

                    let payload = Bytes::copy_from_slice(&self.buffer[self.cursor..self.cursor + size]);
                    self.cursor += size;

                    let expected_hash = if self.layout.trailing_hash {
                        let mut hash = [0u8; HASH_SIZE];
                        hash.copy_from_slice(&self.buffer[self.cursor..self.cursor + HASH_SIZE]);
                        self.cursor += HASH_SIZE;
                        Some(SwarmHash::from_bytes(hash))
                    } else {
                        None
                    };

                    self.decoded += 1;
                    self.state = match self.remaining.as_mut() {
                        Some(remaining) => {
                            *remaining -= 1;
                            if *remaining == 0 {
                                DecodeState::Complete
                            } else {
                                DecodeState::AwaitingSize
                            }
                        }
                        None => DecodeState::AwaitingSize,
                    };

                    return Ok(Some(Frame {
                        payload,
                        expected_hash,
                    }));
                }
            }
        }
    }

    /// Iterate over the frames decodable from the input fed so far
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            decoder: self,
            failed: false,
        }
    }

    /// Declare end of input; leftover partial frame bytes are an error
    pub fn finish(&self) -> Result<(), ProtocolError> {
        let remaining = self.available();
        let mid_frame = matches!(self.state, DecodeState::AwaitingPayload { .. });
        if remaining > 0 || mid_frame {
            return Err(ProtocolError::Truncated { remaining });
        }
        Ok(())
    }

    /// Whether a count-prefixed exchange has received all declared frames
    pub fn is_complete(&self) -> bool {
        self.state == DecodeState::Complete
    }

    /// Number of frames decoded so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.available()
    }

    fn available(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    fn take_u16(&mut self) -> Option<u16> {
        if self.available() < SIZE_PREFIX {
            return None;
        }
        let value = u16::from_le_bytes([self.buffer[self.cursor], self.buffer[self.cursor + 1]]);
        self.cursor += SIZE_PREFIX;
        Some(value)
    }

    /// Drop consumed bytes so the buffer only holds the pending tail
    fn compact(&mut self) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

/// Lazy iterator over decoded frames; stops after the first error
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    failed: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.decoder.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Encode one frame (used by clients and tests)
pub fn encode_frame(payload: &[u8], trailing_hash: Option<&SwarmHash>) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::Oversized {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut out = Vec::with_capacity(SIZE_PREFIX + payload.len() + HASH_SIZE);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    if let Some(hash) = trailing_hash {
        out.extend_from_slice(hash.as_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming() -> FrameDecoder {
        FrameDecoder::new(FrameLayout::streaming(false), DEFAULT_MAX_BUFFER)
    }

    #[test]
    fn test_decodes_back_to_back_frames() {
        let mut decoder = streaming();
        let mut input = encode_frame(b"first-frame", None).unwrap();
        input.extend(encode_frame(b"second", None).unwrap());

        decoder.feed(&input).unwrap();
        let frames: Vec<_> = decoder.frames().collect::<Result<_, _>>().unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].payload[..], b"first-frame");
        assert_eq!(&frames[1].payload[..], b"second");
        assert_eq!(decoder.decoded(), 2);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_resumes_across_every_split_point() {
        let mut input = encode_frame(b"0123456789abcdef", None).unwrap();
        input.extend(encode_frame(b"xyz", None).unwrap());

        for split in 0..=input.len() {
            let mut decoder = streaming();
            let mut payloads = Vec::new();

            for piece in [&input[..split], &input[split..]] {
                decoder.feed(piece).unwrap();
                while let Some(frame) = decoder.next_frame().unwrap() {
                    payloads.push(frame.payload);
                }
            }

            assert_eq!(payloads.len(), 2, "split at {}", split);
            assert_eq!(&payloads[0][..], b"0123456789abcdef");
            assert_eq!(&payloads[1][..], b"xyz");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let payload = vec![7u8; MAX_FRAME_SIZE];
        let input = encode_frame(&payload, None).unwrap();
        let mut decoder = streaming();

        let mut decoded = None;
        for byte in &input {
            decoder.feed(std::slice::from_ref(byte)).unwrap();
            if let Some(frame) = decoder.next_frame().unwrap() {
                decoded = Some(frame);
            }
        }

        assert_eq!(decoded.unwrap().payload.len(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let mut decoder = streaming();
        decoder.feed(&4097u16.to_le_bytes()).unwrap();

        assert_eq!(
            decoder.next_frame(),
            Err(ProtocolError::Oversized { size: 4097, max: 4096 })
        );
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        assert_eq!(
            encode_frame(&[0u8; MAX_FRAME_SIZE + 1], None),
            Err(ProtocolError::Oversized {
                size: MAX_FRAME_SIZE + 1,
                max: MAX_FRAME_SIZE
            })
        );
        assert_eq!(
            encode_frame(&vec![0u8; 70_000], None),
            Err(ProtocolError::Oversized {
                size: 70_000,
                max: MAX_FRAME_SIZE
            })
        );
    }

    #[test]
    fn test_buffer_bound() {
        let mut decoder = FrameDecoder::new(FrameLayout::streaming(false), 16);
        decoder.feed(&[0u8; 10]).unwrap();
        assert!(matches!(
            decoder.feed(&[0u8; 10]),
            Err(ProtocolError::BufferOverflow { buffered: 20, max: 16 })
        ));
    }

    #[test]
    fn test_consumed_bytes_do_not_count_against_bound() {
        let mut decoder = FrameDecoder::new(FrameLayout::streaming(false), 64);
        for _ in 0..10 {
            decoder.feed(&encode_frame(&[1u8; 40], None).unwrap()).unwrap();
            assert!(decoder.next_frame().unwrap().is_some());
        }
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_one_shot_trailing_hash() {
        let hash = SwarmHash::from_bytes([9u8; 32]);
        let mut decoder = FrameDecoder::new(FrameLayout::ONE_SHOT, DEFAULT_MAX_BUFFER);
        decoder.feed(&encode_frame(b"payload", Some(&hash)).unwrap()).unwrap();

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"payload");
        assert_eq!(frame.expected_hash, Some(hash));
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_one_shot_truncated_hash() {
        let hash = SwarmHash::from_bytes([9u8; 32]);
        let mut input = encode_frame(b"payload", Some(&hash)).unwrap();
        input.truncate(input.len() - 5);

        let mut decoder = FrameDecoder::new(FrameLayout::ONE_SHOT, DEFAULT_MAX_BUFFER);
        decoder.feed(&input).unwrap();

        assert_eq!(decoder.next_frame(), Ok(None));
        assert!(matches!(decoder.finish(), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_count_prefix_completes() {
        let mut decoder = FrameDecoder::new(FrameLayout::streaming(true), DEFAULT_MAX_BUFFER);
        let mut input = 2u16.to_le_bytes().to_vec();
        input.extend(encode_frame(b"a", None).unwrap());
        input.extend(encode_frame(b"b", None).unwrap());

        decoder.feed(&input).unwrap();
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(!decoder.is_complete());
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(decoder.is_complete());
        assert_eq!(decoder.next_frame(), Ok(None));

        assert_eq!(decoder.feed(b"more"), Err(ProtocolError::UnexpectedData(2)));
    }

    #[test]
    fn test_zero_count_is_immediately_complete() {
        let mut decoder = FrameDecoder::new(FrameLayout::streaming(true), DEFAULT_MAX_BUFFER);
        decoder.feed(&0u16.to_le_bytes()).unwrap();
        assert_eq!(decoder.next_frame(), Ok(None));
        assert!(decoder.is_complete());
    }
}
