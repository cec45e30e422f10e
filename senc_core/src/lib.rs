//! Split-stream packet codec.
//!
//! Every payload is compressed by a pluggable [`BlockTransform`], split into
//! a command stream and a literal stream, and each stream is entropy coded
//! on its own. [`Writer`] and [`Reader`] carry packets over any byte stream.

pub mod codec;
pub mod entropy;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use codec::{BlockTransform, CompressionMode, PacketCodec};
pub use entropy::{EntropyCoder, EntropyPolicy, EntropyTag};
pub use error::{Error, Result};
pub use format::{read_packet, write_packet, Packet, DEFAULT_MAX_FRAME_LEN, DEFAULT_MAX_PAYLOAD_LEN};
pub use reader::{Reader, ReaderConfig};
pub use writer::{Writer, WriterConfig};
