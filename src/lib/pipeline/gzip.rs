//! Block-parallel gzip encoder.
//!
//! Output is cut into fixed-size blocks. Each block becomes an independent
//! gzip member compressed by libdeflater on a [`WorkerPool`]; members are
//! written in submission order, so the file is a valid multi-member gzip
//! stream that any gzip reader decodes to the original bytes.

use std::collections::VecDeque;
use std::io::{self, Write};

use libdeflater::{CompressionLvl, Compressor};

use super::pool::{BackpressurePolicy, TaskHandle, WorkerPool};
use crate::errors::{PipelineError, Result};

/// Uncompressed bytes per gzip member.
pub const BLOCK_SIZE: usize = 64 * 1024;

fn compress_block(data: &[u8], level: i32) -> Result<Vec<u8>> {
    let level = CompressionLvl::new(level).map_err(|e| PipelineError::InvalidParameter {
        parameter: "compression-level".to_string(),
        reason: format!("{e:?}"),
    })?;
    let mut compressor = Compressor::new(level);
    let mut out = vec![0u8; compressor.gzip_compress_bound(data.len())];
    let len = compressor.gzip_compress(data, &mut out).map_err(|e| PipelineError::Write {
        path: "<gzip block>".into(),
        source: io::Error::other(format!("Gzip compression failed: {e:?}")),
    })?;
    out.truncate(len);
    Ok(out)
}

/// A [`Write`] adapter that gzip-compresses on a pool of threads.
///
/// When every compression thread is busy the writing thread compresses the
/// block itself, so a slow disk or a fast producer never grows memory past
/// `threads * 4` blocks in flight.
pub struct ParallelGzipWriter<W: Write> {
    inner: W,
    pool: WorkerPool,
    level: i32,
    buffer: Vec<u8>,
    pending: VecDeque<TaskHandle<Vec<u8>>>,
    max_pending: usize,
}

impl<W: Write> ParallelGzipWriter<W> {
    /// Wraps `inner` with `threads` compression workers at gzip `level` (1-12).
    ///
    /// # Errors
    /// Returns an error if the level is out of range or a thread cannot be spawned.
    pub fn new(inner: W, threads: usize, level: u32) -> Result<Self> {
        let level = i32::try_from(level).unwrap_or(i32::MAX);
        CompressionLvl::new(level).map_err(|e| PipelineError::InvalidParameter {
            parameter: "compression-level".to_string(),
            reason: format!("{e:?}"),
        })?;
        let threads = threads.max(1);
        Ok(Self {
            inner,
            pool: WorkerPool::new("gzip", threads, threads * 2, BackpressurePolicy::CallerRuns)?,
            level,
            buffer: Vec::with_capacity(BLOCK_SIZE),
            pending: VecDeque::new(),
            max_pending: threads * 4,
        })
    }

    fn submit_buffer(&mut self) -> io::Result<()> {
        let block = std::mem::replace(&mut self.buffer, Vec::with_capacity(BLOCK_SIZE));
        let level = self.level;
        let handle =
            self.pool.submit(move || compress_block(&block, level)).map_err(io::Error::other)?;
        self.pending.push_back(handle);
        while self.pending.len() > self.max_pending {
            self.write_oldest()?;
        }
        Ok(())
    }

    fn write_oldest(&mut self) -> io::Result<()> {
        if let Some(handle) = self.pending.pop_front() {
            let member = handle.wait().map_err(io::Error::other)?;
            self.inner.write_all(&member)?;
        }
        Ok(())
    }

    /// Compresses any buffered bytes, writes every member, and returns the inner writer.
    ///
    /// # Errors
    /// Returns the first compression or write error.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush()?;
        let Self { inner, pool, .. } = self;
        pool.shutdown();
        Ok(inner)
    }
}

impl<W: Write> Write for ParallelGzipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let room = BLOCK_SIZE - self.buffer.len();
            let take = room.min(rest.len());
            self.buffer.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buffer.len() == BLOCK_SIZE {
                self.submit_buffer()?;
            }
        }
        Ok(buf.len())
    }

    /// Emits the partial block as its own member and drains every pending one.
    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.submit_buffer()?;
        }
        while !self.pending.is_empty() {
            self.write_oldest()?;
        }
        self.inner.flush()
    }
}
