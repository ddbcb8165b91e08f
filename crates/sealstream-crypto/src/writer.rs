//! Chunked encrypting sink
//!
//! [`ChunkWriter`] buffers plaintext into a single reusable chunk buffer and
//! seals it to the sink each time it fills. The last, possibly partial, chunk
//! is only written by [`ChunkWriter::close`]; forgetting to close loses it.

use std::io::{self, Write};

use thiserror::Error;
use tracing::{trace, warn};
use zeroize::Zeroize;

use crate::chunk::ChunkCipher;
use crate::key::Key;
use crate::{StreamError, CHUNK_SIZE, SECTOR_SIZE};

/// A sink failure that interrupted a [`ChunkWriter::write_chunks`] call.
#[derive(Debug, Error)]
#[error("chunk flush failed after {written} bytes: {source}")]
pub struct PartialWrite {
    /// Bytes of the failed call that belong to chunks flushed successfully
    /// before the failure.
    pub written: usize,
    #[source]
    pub source: io::Error,
}

impl PartialWrite {
    fn new(written: usize, source: impl Into<io::Error>) -> Self {
        Self {
            written,
            source: source.into(),
        }
    }
}

impl From<PartialWrite> for io::Error {
    fn from(partial: PartialWrite) -> Self {
        partial.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Closed,
    /// A flush failed; the sink holds an unknown prefix of the stream.
    Failed,
}

/// Encrypts everything written to it into sealed chunks on `W`.
///
/// The caller must call [`close`](Self::close) (or [`finish`](Self::finish))
/// to emit the final chunk. [`Write::flush`] only flushes the sink: emitting
/// a partial chunk mid-stream would break the chunk alignment seeking relies
/// on.
pub struct ChunkWriter<W: Write> {
    inner: W,
    cipher: ChunkCipher,
    /// Plaintext of the pending chunk; always `CHUNK_SIZE` long.
    chunk: Box<[u8]>,
    /// Fill cursor into `chunk`.
    pos: usize,
    /// Sealed output, reused across flushes.
    sealed: Vec<u8>,
    state: WriterState,
    /// Sink error held back because the failing `write` reported accepted bytes.
    deferred: Option<io::Error>,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(inner: W, key: &Key) -> Self {
        Self {
            inner,
            cipher: ChunkCipher::new(key),
            chunk: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            pos: 0,
            sealed: Vec::with_capacity(SECTOR_SIZE),
            state: WriterState::Open,
            deferred: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutable access to the sink. Writing to it directly corrupts the stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn is_closed(&self) -> bool {
        self.state == WriterState::Closed
    }

    /// Buffer `buf`, sealing and writing every chunk that fills up.
    ///
    /// On success all of `buf` was accepted. On a sink failure the returned
    /// [`PartialWrite::written`] counts only the bytes of `buf` that went out
    /// in chunks flushed before the failure; bytes buffered for the failing
    /// chunk are not counted. The writer is unusable afterwards.
    pub fn write_chunks(&mut self, buf: &[u8]) -> Result<usize, PartialWrite> {
        match self.state {
            WriterState::Open => {}
            WriterState::Closed => return Err(PartialWrite::new(0, StreamError::WriterClosed)),
            WriterState::Failed => {
                let source = self
                    .deferred
                    .take()
                    .unwrap_or_else(|| StreamError::WriterFailed.into());
                return Err(PartialWrite::new(0, source));
            }
        }

        let mut written = 0;
        let mut rest = buf;
        while !rest.is_empty() {
            let n = (CHUNK_SIZE - self.pos).min(rest.len());
            self.chunk[self.pos..self.pos + n].copy_from_slice(&rest[..n]);
            self.pos += n;
            rest = &rest[n..];

            if self.pos == CHUNK_SIZE {
                if let Err(e) = self.flush_chunk() {
                    self.state = WriterState::Failed;
                    return Err(PartialWrite::new(written, e));
                }
            }
            // bytes of a chunk whose flush failed never reach this line
            written += n;
        }
        Ok(written)
    }

    /// Seal the buffered plaintext and write it to the sink.
    fn flush_chunk(&mut self) -> io::Result<()> {
        if self.pos == 0 {
            return Ok(());
        }
        let len = self.pos;
        self.pos = 0;

        self.cipher.seal_into(&self.chunk[..len], &mut self.sealed)?;
        if let Err(e) = self.inner.write_all(&self.sealed) {
            warn!(plaintext_len = len, error = %e, "chunk write to sink failed");
            return Err(e);
        }
        trace!(plaintext_len = len, sealed_len = self.sealed.len(), "flushed chunk");
        Ok(())
    }

    /// Flush the final partial chunk and close the writer.
    ///
    /// Idempotent: closing a closed writer succeeds without writing. An
    /// empty buffer emits no chunk. Writes after close fail with
    /// [`StreamError::WriterClosed`].
    pub fn close(&mut self) -> io::Result<()> {
        match self.state {
            WriterState::Closed => return Ok(()),
            WriterState::Failed => {
                self.state = WriterState::Closed;
                self.chunk.zeroize();
                return Err(self
                    .deferred
                    .take()
                    .unwrap_or_else(|| StreamError::WriterFailed.into()));
            }
            WriterState::Open => {}
        }

        self.state = WriterState::Closed;
        let result = self.flush_chunk().and_then(|()| self.inner.flush());
        self.chunk.zeroize();
        self.sealed.clear();
        result
    }

    /// Close the writer and return the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.close()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_chunks(buf) {
            Ok(n) => Ok(n),
            Err(PartialWrite { written: 0, source }) => Err(source),
            Err(PartialWrite { written, source }) => {
                // report the accepted bytes now, the failure on the next call
                self.deferred = Some(source);
                Ok(written)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> std::fmt::Debug for ChunkWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkWriter")
            .field("buffered", &self.pos)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
