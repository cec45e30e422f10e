//! Error types for packet encoding, decoding, and framing.

use std::io;

use thiserror::Error;

use crate::entropy::fse::FseError;
use crate::entropy::huffman::HuffError;

/// Result type alias for senc operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Failure of an entropy primitive, tagged with the coder that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("fse: {0}")]
    Fse(#[from] FseError),

    #[error("huffman: {0}")]
    Huffman(#[from] HuffError),
}

/// Packet codec error types.
#[derive(Debug, Error)]
pub enum Error {
    /// A substream tag byte that no decoder understands.
    #[error("unknown entropy tag 0x{0:02x}")]
    UnknownEntropyTag(u8),

    /// The entropy primitive failed while compressing a substream.
    #[error("entropy encode failed: {0}")]
    EntropyEncode(#[source] PrimitiveError),

    /// The entropy primitive rejected a substream as corrupt.
    #[error("entropy decode failed: {0}")]
    EntropyDecode(#[source] PrimitiveError),

    /// Compress, decompress, split or merge of a block failed.
    #[error("{transform} block transform failed: {message}")]
    BlockTransform {
        transform: &'static str,
        message: String,
    },

    /// A packet claims a payload longer than the decoder accepts.
    #[error("packet claims {len} bytes, limit is {limit}")]
    PayloadTooLarge { len: u64, limit: u64 },

    /// The next frame could not be parsed.
    #[error("frame decode failed: {0}")]
    FrameDecode(String),

    /// A packet could not be serialized to the sink.
    #[error("frame encode failed: {0}")]
    FrameEncode(String),

    /// The source ended cleanly on a frame boundary.
    #[error("end of stream")]
    EndOfStream,

    /// I/O error from the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a block transform error.
    pub fn block(transform: &'static str, message: impl Into<String>) -> Self {
        Error::BlockTransform {
            transform,
            message: message.into(),
        }
    }

    /// Map a bincode failure on the read side. Truncation inside a frame is
    /// reported as a frame error rather than a plain I/O error.
    pub(crate) fn frame_decode(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io_err) if io_err.kind() != io::ErrorKind::UnexpectedEof => {
                Error::Io(io_err)
            }
            other => Error::FrameDecode(other.to_string()),
        }
    }

    pub(crate) fn frame_encode(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io_err) => Error::Io(io_err),
            other => Error::FrameEncode(other.to_string()),
        }
    }

    /// True for the terminal end-of-source condition.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }

    /// Stable `io::ErrorKind` used when surfacing this error through
    /// `std::io::Read` / `std::io::Write`.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Error::Io(e) => e.kind(),
            Error::EndOfStream => io::ErrorKind::UnexpectedEof,
            Error::FrameEncode(_) => io::ErrorKind::Other,
            Error::UnknownEntropyTag(_)
            | Error::EntropyEncode(_)
            | Error::EntropyDecode(_)
            | Error::BlockTransform { .. }
            | Error::PayloadTooLarge { .. }
            | Error::FrameDecode(_) => io::ErrorKind::InvalidData,
        }
    }

    /// Build an `io::Error` describing this error without consuming it, so a
    /// recorded error can be reported any number of times.
    pub fn to_io(&self) -> io::Error {
        io::Error::new(self.io_kind(), self.to_string())
    }

    /// Error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Error::UnknownEntropyTag(_) => "unknown_entropy_tag",
            Error::EntropyEncode(_) => "entropy_encode",
            Error::EntropyDecode(_) => "entropy_decode",
            Error::BlockTransform { .. } => "block_transform",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::FrameDecode(_) => "frame_decode",
            Error::FrameEncode(_) => "frame_encode",
            Error::EndOfStream => "end_of_stream",
            Error::Io(_) => "io_error",
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}
