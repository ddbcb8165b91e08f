use std::io;

use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

pub type SealstreamResult<T> = Result<T, SealstreamError>;

/// Failures of the key, chunk codec, and streaming adapters.
///
/// Kept `Clone` so a reader can latch a failure and report it again on
/// every later call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("expected 32-byte key, decoded {0} bytes")]
    InvalidKeyLength(usize),

    #[error("key is not valid base64: {0}")]
    KeyDecode(String),

    #[error("failed to generate random data: {0}")]
    Rng(String),

    #[error("chunk plaintext of {0} bytes exceeds the chunk size")]
    ChunkTooLarge(usize),

    #[error("malformed chunk: {0} bytes is shorter than the nonce")]
    MalformedChunk(usize),

    #[error("chunk authentication failed: wrong key or corrupted data")]
    AuthenticationFailure,

    #[error("write on closed writer")]
    WriterClosed,

    #[error("writer is unusable after a failed flush")]
    WriterFailed,

    #[error("seek is not supported by the underlying source")]
    SeekUnsupported,

    #[error("invalid seek to a negative or overflowing position")]
    InvalidSeek,

    #[error("seek from end requires the source size, which is unknown")]
    SourceSizeUnknown,

    #[error("{0} bytes is not a valid encrypted stream length")]
    InvalidEncryptedLength(u64),

    #[error("expected source seek position {expected}, got {actual}")]
    SeekMismatch { expected: u64, actual: u64 },

    #[error("source read failed: {0}")]
    SourceRead(String),
}

impl StreamError {
    /// Recover the typed error carried by an [`io::Error`] produced by the
    /// streaming adapters.
    pub fn from_io(error: &io::Error) -> Option<&StreamError> {
        error.get_ref()?.downcast_ref::<StreamError>()
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            StreamError::MalformedChunk(_)
            | StreamError::AuthenticationFailure
            | StreamError::InvalidEncryptedLength(_) => io::ErrorKind::InvalidData,
            StreamError::InvalidKeyLength(_)
            | StreamError::KeyDecode(_)
            | StreamError::ChunkTooLarge(_)
            | StreamError::InvalidSeek => io::ErrorKind::InvalidInput,
            StreamError::SeekUnsupported | StreamError::SourceSizeUnknown => {
                io::ErrorKind::Unsupported
            }
            StreamError::Rng(_)
            | StreamError::WriterClosed
            | StreamError::WriterFailed
            | StreamError::SeekMismatch { .. }
            | StreamError::SourceRead(_) => io::ErrorKind::Other,
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(error: StreamError) -> Self {
        io::Error::new(error.io_kind(), error)
    }
}

/// Application-level errors (config loading, key files).
#[derive(Debug, Error)]
pub enum SealstreamError {
    #[error("config error: {0}")]
    Config(String),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_stream_error() {
        let err: io::Error = StreamError::AuthenticationFailure.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(
            StreamError::from_io(&err),
            Some(&StreamError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_io_error_kinds() {
        let kind = |e: StreamError| io::Error::from(e).kind();
        assert_eq!(kind(StreamError::InvalidSeek), io::ErrorKind::InvalidInput);
        assert_eq!(kind(StreamError::SeekUnsupported), io::ErrorKind::Unsupported);
        assert_eq!(kind(StreamError::SourceSizeUnknown), io::ErrorKind::Unsupported);
        assert_eq!(kind(StreamError::MalformedChunk(3)), io::ErrorKind::InvalidData);
        assert_eq!(kind(StreamError::WriterClosed), io::ErrorKind::Other);
    }

    #[test]
    fn test_from_io_foreign_error() {
        let err = io::Error::new(io::ErrorKind::BrokenPipe, "sink gone");
        assert!(StreamError::from_io(&err).is_none());

        let bare = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(StreamError::from_io(&bare).is_none());
    }
}
