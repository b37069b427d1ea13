//! Performance utilities: parallel per-page block encoding and write-buffer
//! batching.
//!
//! # Parallel block encoding
//!
//! [`encode_blocks_parallel`] runs [`crate::block::Block::encode`] (CRC16 +
//! RS(255,223)) across every block on a page concurrently using Rayon. Each
//! block's CRC/ECC computation is independent of every other block's, so
//! this is embarrassingly parallel with no shared mutable state — exactly
//! the kind of internal speed-up `spec.md` §5 allows as long as it doesn't
//! change the step machine's external suspension contract: `encode::
//! EncodeState::next_step` calls this once per page and still returns
//! exactly one `StepOutcome` per call.
//!
//! # Write buffer
//!
//! [`WriteBuffer`] accumulates small writes into a fixed-capacity buffer and
//! flushes to the underlying writer in large aligned chunks, reducing
//! `write` syscall counts when streaming a rendered page's BMP pixel rows.

use std::io::{self, Write};

use crate::block::Block;

/// Encode every block on a page (CRC16 + RS parity) in scan order.
///
/// With the `parallel` feature enabled, blocks are encoded concurrently via
/// Rayon; without it, this runs sequentially. Output order always matches
/// input order regardless of which path runs.
pub fn encode_blocks_parallel(blocks: &[Block]) -> Vec<[u8; crate::block::BLOCK_LEN]> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        blocks.par_iter().map(Block::encode).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        blocks.iter().map(Block::encode).collect()
    }
}

/// Buffered writer with configurable flush threshold.
///
/// Accumulates writes up to `capacity` bytes and flushes to the underlying
/// writer when the buffer is full or when `flush()` is called explicitly.
/// Unlike `std::io::BufWriter`, this exposes `bytes_written()` and is tuned
/// for the CLI's BMP-writing pattern (one large sequential pixel buffer per
/// page).
pub struct WriteBuffer<W: Write> {
    inner: W,
    buf: Vec<u8>,
    capacity: usize,
    pub bytes_written: u64,
}

impl<W: Write> WriteBuffer<W> {
    /// Create a new `WriteBuffer` with the given capacity in bytes.
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity,
            bytes_written: 0,
        }
    }

    fn flush_if_full(&mut self) -> io::Result<()> {
        if self.buf.len() >= self.capacity {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for WriteBuffer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() >= self.capacity {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
            self.inner.write_all(buf)?;
        } else {
            self.buf.extend_from_slice(buf);
            self.flush_if_full()?;
        }
        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.inner.flush()
    }
}
