use tracing::{debug, trace};

use crate::entropy::{EntropyCoder, EntropyPolicy};
use crate::error::{Error, Result};
use crate::format::{Packet, DEFAULT_MAX_PAYLOAD_LEN};

/// How hard the block transform should try when encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionMode {
    #[default]
    Fast,
    /// Slower, higher-ratio compression. Decoding is identical.
    BestEffort,
}

/// Boundary to an LZ-style block compressor.
///
/// Implementations must satisfy:
/// - `decompress` inverts both `compress` and `compress_best_effort`.
/// - `merge(split(block)) == block` for every block they produce.
/// - `decompress` fails instead of truncating or overrunning when the block
///   is malformed or does not decode to exactly `out.len()` bytes.
///
/// Output buffers are cleared by the callee; their capacity is reused.
pub trait BlockTransform: Send {
    /// Human-readable transform name for logs and CLI display.
    fn name(&self) -> &'static str;

    /// Compress `data` into `block` with the fast encoder.
    fn compress(&mut self, data: &[u8], block: &mut Vec<u8>) -> Result<()>;

    /// Like [`BlockTransform::compress`], trading speed for a smaller block.
    fn compress_best_effort(&mut self, data: &[u8], block: &mut Vec<u8>) -> Result<()>;

    /// Split a block into its command and literal streams.
    fn split(&self, block: &[u8], commands: &mut Vec<u8>, literals: &mut Vec<u8>) -> Result<()>;

    /// Inverse of [`BlockTransform::split`].
    fn merge(&self, commands: &[u8], literals: &[u8], block: &mut Vec<u8>) -> Result<()>;

    /// Decompress `block` into `out`, which is exactly the expected length.
    fn decompress(&self, block: &[u8], out: &mut [u8]) -> Result<()>;

    /// Largest payload a block of `block_len` bytes can decompress to.
    /// Decoding rejects larger claimed lengths before allocating.
    fn max_decompressed_len(&self, _block_len: usize) -> usize {
        usize::MAX
    }

    /// Largest block either compressor emits for `payload_len` input bytes.
    /// Bounds each decoded substream before it is expanded.
    fn max_block_len(&self, _payload_len: usize) -> usize {
        usize::MAX
    }
}

/// Encodes payloads into [`Packet`]s and back.
///
/// All working buffers are owned and reused; they only ever grow.
pub struct PacketCodec {
    transform: Box<dyn BlockTransform>,
    command: EntropyCoder,
    literal: EntropyCoder,
    /// Compressed block, on both the encode and the decode side.
    block: Vec<u8>,
    /// Decoded payload; `decode` hands out a view of its prefix.
    output: Vec<u8>,
    last_len: usize,
    max_payload_len: u64,
    commands: Vec<u8>,
    literals: Vec<u8>,
}

impl PacketCodec {
    pub fn new(transform: Box<dyn BlockTransform>) -> Self {
        Self::with_policy(transform, EntropyPolicy::default())
    }

    pub fn with_policy(transform: Box<dyn BlockTransform>, policy: EntropyPolicy) -> Self {
        Self {
            transform,
            command: EntropyCoder::new(policy),
            literal: EntropyCoder::new(policy),
            block: Vec::new(),
            output: Vec::new(),
            last_len: 0,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            commands: Vec::new(),
            literals: Vec::new(),
        }
    }

    pub fn transform_name(&self) -> &'static str {
        self.transform.name()
    }

    /// Largest `original_length` [`decode`](PacketCodec::decode) accepts.
    pub fn max_payload_len(&self) -> u64 {
        self.max_payload_len
    }

    pub fn set_max_payload_len(&mut self, limit: u64) {
        self.max_payload_len = limit;
    }

    /// Encode `data` into `packet`, overwriting it. On failure the packet is
    /// left empty, never half-written.
    pub fn encode(&mut self, data: &[u8], mode: CompressionMode, packet: &mut Packet) -> Result<()> {
        let result = self.encode_into(data, mode, packet);
        if result.is_err() {
            packet.clear();
        }
        result
    }

    fn encode_into(&mut self, data: &[u8], mode: CompressionMode, packet: &mut Packet) -> Result<()> {
        match mode {
            CompressionMode::Fast => self.transform.compress(data, &mut self.block)?,
            CompressionMode::BestEffort => {
                self.transform.compress_best_effort(data, &mut self.block)?
            }
        }
        self.transform
            .split(&self.block, &mut self.commands, &mut self.literals)?;

        let command_tag = self.command.encode(&self.commands, &mut packet.command_data);
        let literal_tag = self.literal.encode(&self.literals, &mut packet.literal_data);
        packet.command_tag = command_tag?.as_u8();
        packet.literal_tag = literal_tag?.as_u8();
        packet.original_length = data.len() as u64;

        trace!(
            raw = data.len(),
            block = self.block.len(),
            commands = self.commands.len(),
            literals = self.literals.len(),
            encoded = packet.encoded_len(),
            command_tag = packet.command_tag,
            literal_tag = packet.literal_tag,
            "encoded packet"
        );
        Ok(())
    }

    /// Decode `packet` and return exactly `packet.original_length` bytes.
    ///
    /// The returned slice is a view into this codec's output buffer; it is
    /// invalidated by the next call on the codec.
    ///
    /// Nothing is allocated for a packet whose claimed length is over
    /// [`max_payload_len`](PacketCodec::max_payload_len), and neither
    /// substream may decode to more than the transform's block bound for
    /// that length.
    pub fn decode(&mut self, packet: &Packet) -> Result<&[u8]> {
        self.last_len = 0;
        if packet.original_length > self.max_payload_len {
            return Err(Error::PayloadTooLarge {
                len: packet.original_length,
                limit: self.max_payload_len,
            });
        }
        let len = usize::try_from(packet.original_length)
            .map_err(|_| Error::block(self.transform.name(), "original length exceeds address space"))?;
        let stream_limit = self.transform.max_block_len(len);

        let commands = self
            .command
            .decode(packet.command_tag, &packet.command_data, stream_limit);
        let literals = self
            .literal
            .decode(packet.literal_tag, &packet.literal_data, stream_limit);
        let (commands, literals) = (commands?, literals?);

        self.transform.merge(commands, literals, &mut self.block)?;
        if len > self.transform.max_decompressed_len(self.block.len()) {
            return Err(Error::block(
                self.transform.name(),
                format!("original length {} too large for a {}-byte block", len, self.block.len()),
            ));
        }

        if self.output.len() < len {
            self.output.resize(len, 0);
        }
        let out = &mut self.output[..len];
        self.transform.decompress(&self.block, out)?;
        self.last_len = len;

        trace!(
            raw = len,
            block = self.block.len(),
            command_tag = packet.command_tag,
            literal_tag = packet.literal_tag,
            "decoded packet"
        );
        Ok(&self.output[..len])
    }

    /// The payload returned by the most recent successful [`decode`], or
    /// empty if the last decode failed.
    ///
    /// [`decode`]: PacketCodec::decode
    pub fn last_output(&self) -> &[u8] {
        &self.output[..self.last_len]
    }

    /// Reset entropy state before serving a new, unrelated stream.
    pub fn reset(&mut self) {
        debug!(transform = self.transform.name(), "resetting packet codec");
        self.command.reset();
        self.literal.reset();
    }
}
