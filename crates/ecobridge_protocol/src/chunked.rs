//! Chunked-transfer reassembly
//!
//! Characteristics larger than one BLE payload are read repeatedly. Every read returns a
//! frame of `[header, payload...]`; bit `0x40` of the header marks the final chunk.
//!
//! - The first frame always seeds the buffer, whatever its header says.
//! - Interior frames (final bit clear) are appended.
//! - The final frame is appended only when its checksum-14 differs from the previous raw
//!   frame. Devices sometimes answer the closing read with a copy of the last chunk, and
//!   that copy must not be appended twice.
//!
//! The checksum covers the whole frame, header included, with the final bit cleared: a
//! repeat carries the final flag where the original chunk did not.

use crate::checksum::checksum14;
use crate::error::{CodecError, CodecResult};

/// Header bit marking the final chunk
pub const FINAL_FLAG: u8 = 0x40;

/// Upper bound on frames in one transfer
pub const MAX_CHUNKS: usize = 256;

/// Outcome of feeding one frame to the assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Another read is required
    NeedMore,
    /// The transfer is finished; take the buffer
    Complete,
}

/// Reassembly state for one characteristic read session
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    buffer: Vec<u8>,
    previous: Vec<u8>,
    frames: usize,
    complete: bool,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next raw frame (header included)
    pub fn push(&mut self, frame: &[u8]) -> CodecResult<ChunkStatus> {
        if self.complete {
            return Ok(ChunkStatus::Complete);
        }

        let (&header, payload) = frame.split_first().ok_or(CodecError::EmptyFrame)?;

        if self.frames >= MAX_CHUNKS {
            return Err(CodecError::TooManyChunks { limit: MAX_CHUNKS });
        }

        let mut raw = Vec::with_capacity(frame.len());
        raw.push(header & !FINAL_FLAG);
        raw.extend_from_slice(payload);

        let status = if self.frames == 0 || header & FINAL_FLAG == 0 {
            self.buffer.extend_from_slice(payload);
            ChunkStatus::NeedMore
        } else {
            if checksum14(&raw) != checksum14(&self.previous) {
                self.buffer.extend_from_slice(payload);
            }
            self.complete = true;
            ChunkStatus::Complete
        };

        self.previous = raw;
        self.frames += 1;

        Ok(status)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of frames consumed so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Take the assembled buffer
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// Assemble an already-captured frame sequence, stopping at the final chunk
pub fn assemble<'a, I>(frames: I) -> CodecResult<Vec<u8>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut assembler = ChunkAssembler::new();
    for frame in frames {
        if assembler.push(frame)? == ChunkStatus::Complete {
            return Ok(assembler.into_buffer());
        }
    }
    Err(CodecError::malformed(
        "chunked transfer",
        format!("ended after {} frames without a final chunk", assembler.frames()),
    ))
}
