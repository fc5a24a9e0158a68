//! Fixed-size frame re-chunking
//!
//! AI audio arrives in arbitrary lengths; the telephony leg only accepts
//! whole 20 ms frames. The chunker emits complete frames in byte order and
//! keeps the incomplete tail for the next call.

use bytes::Bytes;

/// Split `chunk` into `frame_size` frames, prepending and updating `remainder`.
///
/// Empty input (or a zero frame size) yields no frames and leaves the
/// remainder untouched.
pub fn rechunk(chunk: &[u8], frame_size: usize, remainder: &mut Vec<u8>) -> Vec<Bytes> {
    if chunk.is_empty() || frame_size == 0 {
        return Vec::new();
    }

    remainder.extend_from_slice(chunk);
    let complete = remainder.len() / frame_size * frame_size;
    if complete == 0 {
        return Vec::new();
    }

    let frames = remainder[..complete]
        .chunks_exact(frame_size)
        .map(Bytes::copy_from_slice)
        .collect();
    remainder.drain(..complete);
    frames
}

/// Stateful wrapper around [`rechunk`]
#[derive(Debug, Clone)]
pub struct FrameChunker {
    frame_size: usize,
    remainder: Vec<u8>,
}

impl FrameChunker {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            remainder: Vec::with_capacity(frame_size),
        }
    }

    /// Feed bytes, get back every frame completed so far
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        rechunk(chunk, self.frame_size, &mut self.remainder)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bytes waiting for the next frame
    pub fn pending(&self) -> usize {
        self.remainder.len()
    }

    pub fn clear(&mut self) {
        self.remainder.clear();
    }
}
