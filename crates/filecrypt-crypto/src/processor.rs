//! Fixed-window chunk driver with throttled progress
//!
//! Splits an input into windows of `chunk_size` bytes (default 1 MiB), feeds
//! them through a [`CipherEngine`] strictly in order and flags the last
//! window as final. Progress is reported as a percentage of input consumed,
//! at most once per `progress_interval`, plus exactly one 100 at the end.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::{CipherEngine, Mode};
use crate::error::{CryptoError, CryptoResult};
use crate::{BLOCK_SIZE, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Window size in bytes; must be a non-zero multiple of 16
    pub chunk_size: usize,
    /// Minimum time between intermediate progress events
    pub progress_interval: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// Drives a [`CipherEngine`] over an input one window at a time.
#[derive(Debug, Clone, Default)]
pub struct ChunkProcessor {
    options: ProcessorOptions,
}

impl ChunkProcessor {
    pub fn new(options: ProcessorOptions) -> CryptoResult<Self> {
        if options.chunk_size == 0 || options.chunk_size % BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidInput(format!(
                "chunk size {} is not a positive multiple of {BLOCK_SIZE}",
                options.chunk_size
            )));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Process an in-memory input and return the assembled output.
    ///
    /// On error nothing is returned; partial output is dropped.
    pub fn run<F>(
        &self,
        input: &[u8],
        engine: &mut CipherEngine,
        on_progress: F,
    ) -> CryptoResult<Vec<u8>>
    where
        F: FnMut(u8),
    {
        let mut out = Vec::with_capacity(input.len() + BLOCK_SIZE);
        self.run_stream(input, &mut out, input.len() as u64, engine, on_progress)?;
        Ok(out)
    }

    /// Process `reader` into `writer`, returning the number of bytes written.
    ///
    /// `total_len` is only used to compute percentages; the stream is read
    /// until EOF regardless. One window of look-ahead decides which window is
    /// final, so an input that is an exact multiple of the window size still
    /// gets its padding on the last non-empty window.
    pub fn run_stream<R, W, F>(
        &self,
        mut reader: R,
        mut writer: W,
        total_len: u64,
        engine: &mut CipherEngine,
        mut on_progress: F,
    ) -> CryptoResult<u64>
    where
        R: Read,
        W: Write,
        F: FnMut(u8),
    {
        let size = self.options.chunk_size;
        let mut current = vec![0u8; size];
        let mut next = vec![0u8; size];

        let mut current_len = read_window(&mut reader, &mut current)?;
        if current_len == 0 {
            return Err(match engine.mode() {
                Mode::Encrypt => CryptoError::InvalidInput("input is empty".into()),
                Mode::Decrypt => CryptoError::MalformedCiphertext(0),
            });
        }

        let mut progress = Progress::new(total_len, self.options.progress_interval);
        let mut consumed = 0u64;
        let mut written = 0u64;
        let mut windows = 0u64;

        loop {
            let next_len = read_window(&mut reader, &mut next)?;
            let is_final = next_len == 0;

            let out = engine.process_chunk(&current[..current_len], is_final)?;
            writer.write_all(&out)?;
            written += out.len() as u64;
            consumed += current_len as u64;
            windows += 1;

            if is_final {
                break;
            }
            progress.update(consumed, &mut on_progress);

            std::mem::swap(&mut current, &mut next);
            current_len = next_len;
        }

        writer.flush()?;
        progress.complete(&mut on_progress);
        debug!(
            mode = ?engine.mode(),
            windows,
            bytes_in = consumed,
            bytes_out = written,
            "chunk run complete"
        );
        Ok(written)
    }
}

/// Fill `buf` from `reader` until it is full or EOF; returns bytes read.
fn read_window<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Throttled, non-decreasing percentage reporter.
struct Progress {
    total: u64,
    interval: Duration,
    last_emit: Instant,
    last_value: u8,
}

impl Progress {
    fn new(total: u64, interval: Duration) -> Self {
        Self {
            total,
            interval,
            last_emit: Instant::now(),
            last_value: 0,
        }
    }

    fn update<F: FnMut(u8)>(&mut self, consumed: u64, emit: &mut F) {
        if self.total == 0 {
            return;
        }
        // 100 is reserved for completion
        let pct = (consumed.saturating_mul(100) / self.total).min(99) as u8;
        if pct > self.last_value && self.last_emit.elapsed() >= self.interval {
            self.last_value = pct;
            self.last_emit = Instant::now();
            emit(pct);
        }
    }

    fn complete<F: FnMut(u8)>(&mut self, emit: &mut F) {
        self.last_value = 100;
        emit(100);
    }
}
