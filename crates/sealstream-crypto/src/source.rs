//! Optional capabilities of a ciphertext source
//!
//! [`ChunkReader`](crate::ChunkReader) decrypts from any `Read`. Seeking needs
//! more: repositioning the source, and for `SeekFrom::End` its total size.
//! Those are optional capabilities of [`Source`], queried when a seek runs.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek};

/// A readable ciphertext source with optional seek and size capabilities.
pub trait Source: Read {
    /// Seek capability, if the source has one.
    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        None
    }

    /// Total size of the source in bytes, if it can be determined.
    fn size(&mut self) -> Option<io::Result<u64>> {
        None
    }
}

impl Source for File {
    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        Some(self)
    }

    fn size(&mut self) -> Option<io::Result<u64>> {
        Some(self.metadata().map(|m| m.len()))
    }
}

impl<T: AsRef<[u8]>> Source for Cursor<T> {
    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        Some(self)
    }

    fn size(&mut self) -> Option<io::Result<u64>> {
        Some(Ok(self.get_ref().as_ref().len() as u64))
    }
}

impl Source for &[u8] {}

impl<S: Source + ?Sized> Source for &mut S {
    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        (**self).seeker()
    }

    fn size(&mut self) -> Option<io::Result<u64>> {
        (**self).size()
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        (**self).seeker()
    }

    fn size(&mut self) -> Option<io::Result<u64>> {
        (**self).size()
    }
}

/// A forward-only source: pipes, sockets, stdin.
#[derive(Debug)]
pub struct Sequential<R>(pub R);

impl<R: Read> Read for Sequential<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> Source for Sequential<R> {}

/// A seekable source whose size is only known if supplied.
#[derive(Debug)]
pub struct Seekable<R> {
    inner: R,
    len: Option<u64>,
}

impl<R: Read + Seek> Seekable<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, len: None }
    }

    /// A seekable source of known total length, enabling `SeekFrom::End`.
    pub fn with_len(inner: R, len: u64) -> Self {
        Self {
            inner,
            len: Some(len),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Seekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> Source for Seekable<R> {
    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        Some(&mut self.inner)
    }

    fn size(&mut self) -> Option<io::Result<u64>> {
        self.len.map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{SeekFrom, Write};

    #[test]
    fn test_cursor_capabilities() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        assert!(cursor.seeker().is_some());
        assert_eq!(cursor.size().unwrap().unwrap(), 100);
    }

    #[test]
    fn test_file_capabilities() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[9u8; 300]).unwrap();

        assert_eq!(file.size().unwrap().unwrap(), 300);
        let seeker = file.seeker().unwrap();
        assert_eq!(seeker.seek(SeekFrom::Start(12)).unwrap(), 12);
    }

    #[test]
    fn test_sequential_has_no_capabilities() {
        let mut source = Sequential(&b"abc"[..]);
        assert!(source.seeker().is_none());
        assert!(source.size().is_none());

        let mut slice: &[u8] = b"abc";
        assert!(slice.seeker().is_none());
    }

    #[test]
    fn test_seekable_size_only_when_given() {
        let mut plain = Seekable::new(Cursor::new(vec![1u8; 10]));
        assert!(plain.seeker().is_some());
        assert!(plain.size().is_none());

        let mut sized = Seekable::with_len(Cursor::new(vec![1u8; 10]), 10);
        assert_eq!(sized.size().unwrap().unwrap(), 10);
    }

    #[test]
    fn test_mut_ref_forwards() {
        fn capabilities<S: Source>(mut source: S) -> (bool, Option<u64>) {
            let size = source.size().map(|r| r.unwrap());
            (source.seeker().is_some(), size)
        }

        let mut cursor = Cursor::new(vec![0u8; 7]);
        assert_eq!(capabilities(&mut cursor), (true, Some(7)));

        let mut pipe = Sequential(&b"xyz"[..]);
        assert_eq!(capabilities(&mut pipe), (false, None));
    }
}
