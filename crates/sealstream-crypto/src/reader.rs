//! Chunked decrypting source with random access
//!
//! [`ChunkReader`] pulls one sector at a time from its source, opens it, and
//! serves the plaintext. A short final read is the last chunk; a read of zero
//! bytes is the end of the stream.
//!
//! Seeking maps a logical (plaintext) offset to the start of the sector that
//! holds it, repositions the source there, and records how many leading
//! plaintext bytes of that chunk the next read must discard.

use std::io::{self, BufRead, Read, Seek, SeekFrom};

use tracing::{debug, trace, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::chunk::ChunkCipher;
use crate::key::Key;
use crate::source::Source;
use crate::{plaintext_len, StreamError, StreamResult, CHUNK_SIZE, SECTOR_SIZE};

#[derive(Debug)]
enum Terminal {
    /// The source is exhausted.
    Eof,
    /// A chunk failed to open, the source failed mid-sector, or a seek left
    /// the source at an unknown position. Cleared only by a successful seek,
    /// which realigns the source on a sector boundary.
    Failed(StreamError),
}

/// Decrypts a stream produced by [`ChunkWriter`](crate::ChunkWriter).
///
/// Implements [`Read`] and [`BufRead`] over any `Read`, and [`Seek`] when the
/// source implements [`Source`]. Sources without a seek capability fail
/// seeks with [`StreamError::SeekUnsupported`].
pub struct ChunkReader<R: Read> {
    inner: R,
    cipher: ChunkCipher,
    /// Ciphertext of the sector being opened; always `SECTOR_SIZE` long.
    sector: Box<[u8]>,
    /// Plaintext of the current chunk; wiped on drop.
    plaintext: Zeroizing<Vec<u8>>,
    /// Read cursor into `plaintext`.
    cursor: usize,
    /// Logical offset: plaintext bytes delivered, or the last seek target.
    offset: u64,
    /// Leading bytes of the next opened chunk to discard.
    skip: usize,
    terminal: Option<Terminal>,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, key: &Key) -> Self {
        Self {
            inner,
            cipher: ChunkCipher::new(key),
            sector: vec![0u8; SECTOR_SIZE].into_boxed_slice(),
            plaintext: Zeroizing::new(Vec::with_capacity(CHUNK_SIZE)),
            cursor: 0,
            offset: 0,
            skip: 0,
            terminal: None,
        }
    }

    /// Current logical (plaintext) position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutable access to the source. Moving its cursor desynchronises the reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Pull and open the next chunk. Returns `false` at end of stream.
    fn next_chunk(&mut self) -> io::Result<bool> {
        match &self.terminal {
            Some(Terminal::Eof) => return Ok(false),
            Some(Terminal::Failed(e)) => return Err(e.clone().into()),
            None => {}
        }

        let n = match read_full(&mut self.inner, &mut self.sector) {
            Ok(n) => n,
            Err(e) => {
                self.terminal = Some(Terminal::Failed(StreamError::SourceRead(e.to_string())));
                return Err(e);
            }
        };
        if n < SECTOR_SIZE {
            // a short sector is the final chunk
            self.terminal = Some(Terminal::Eof);
            if n == 0 {
                return Ok(false);
            }
        }

        if let Err(e) = self.cipher.open_into(&self.sector[..n], &mut self.plaintext) {
            warn!(offset = self.offset, sealed_len = n, error = %e, "chunk failed to open");
            self.cursor = 0;
            self.terminal = Some(Terminal::Failed(e.clone()));
            return Err(e.into());
        }

        self.cursor = self.skip.min(self.plaintext.len());
        self.skip = 0;
        trace!(
            offset = self.offset,
            plaintext_len = self.plaintext.len(),
            skipped = self.cursor,
            "opened chunk"
        );
        Ok(true)
    }
}

impl<R: Read> Read for ChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for ChunkReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.cursor == self.plaintext.len() {
            if !self.next_chunk()? {
                break;
            }
        }
        Ok(&self.plaintext[self.cursor..])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.plaintext.len() - self.cursor);
        self.cursor += amt;
        self.offset += amt as u64;
    }
}

impl<R: Source> ChunkReader<R> {
    /// Resolve `pos` to a logical target. The second value is the plaintext
    /// length of the last chunk when the target lies past the end of data.
    fn seek_target(&mut self, pos: SeekFrom) -> io::Result<(u64, Option<usize>)> {
        match pos {
            SeekFrom::Start(target) => Ok((target, None)),
            SeekFrom::Current(delta) => Ok((offset_by(self.offset, delta)?, None)),
            SeekFrom::End(delta) => {
                let size = match self.inner.size() {
                    Some(size) => size?,
                    None => return Err(StreamError::SourceSizeUnknown.into()),
                };
                let data_size = plaintext_len(size)?;
                let target = offset_by(data_size, delta)?;
                let overshoot = (target > data_size).then(|| last_chunk_len(data_size));
                Ok((target, overshoot))
            }
        }
    }
}

impl<R: Source> Seek for ChunkReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.inner.seeker().is_none() {
            return Err(StreamError::SeekUnsupported.into());
        }

        let (target, overshoot) = self.seek_target(pos)?;
        let physical = (target / CHUNK_SIZE as u64)
            .checked_mul(SECTOR_SIZE as u64)
            .ok_or(StreamError::InvalidSeek)?;

        let seeker = self.inner.seeker().ok_or(StreamError::SeekUnsupported)?;
        if let Err(e) = reposition(seeker, physical) {
            // the source now sits at an unknown position
            let latched = StreamError::from_io(&e)
                .cloned()
                .unwrap_or_else(|| StreamError::SourceRead(e.to_string()));
            warn!(target, physical, error = %e, "source seek failed");
            self.plaintext.zeroize();
            self.cursor = 0;
            self.skip = 0;
            self.terminal = Some(Terminal::Failed(latched));
            return Err(e);
        }

        // past the end: land exactly at end of data, like a file
        self.skip = overshoot.unwrap_or((target % CHUNK_SIZE as u64) as usize);
        self.plaintext.zeroize();
        self.cursor = 0;
        self.offset = target;
        self.terminal = None;

        debug!(target, physical, skip = self.skip, "seeked");
        Ok(target)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.offset)
    }
}

impl<R: Read> std::fmt::Debug for ChunkReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("offset", &self.offset)
            .field("pending", &(self.plaintext.len() - self.cursor))
            .field("skip", &self.skip)
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}

/// Seek `seeker` to `physical`, failing if it lands anywhere else.
fn reposition(seeker: &mut dyn Seek, physical: u64) -> io::Result<()> {
    let actual = seeker.seek(SeekFrom::Start(physical))?;
    if actual != physical {
        return Err(StreamError::SeekMismatch {
            expected: physical,
            actual,
        }
        .into());
    }
    Ok(())
}

fn offset_by(base: u64, delta: i64) -> StreamResult<u64> {
    base.checked_add_signed(delta).ok_or(StreamError::InvalidSeek)
}

/// Plaintext length of the final chunk of a stream of `data_size` bytes.
fn last_chunk_len(data_size: u64) -> usize {
    match (data_size % CHUNK_SIZE as u64) as usize {
        0 if data_size > 0 => CHUNK_SIZE,
        rem => rem,
    }
}

/// Read until `buf` is full or the source reports end of stream.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
