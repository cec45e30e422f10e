use std::io::{self, Write};

use tracing::debug;

use crate::codec::{BlockTransform, CompressionMode, PacketCodec};
use crate::entropy::EntropyPolicy;
use crate::error::Result;
use crate::format::{write_packet, Packet};

/// Encoding knobs for a [`Writer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterConfig {
    pub mode: CompressionMode,
    pub entropy: EntropyPolicy,
}

/// Streaming writer that turns each written slice into one packet.
///
/// # Write contract
/// Every call to [`Writer::write_packet`] (or `io::Write::write`) is an
/// independent compression unit: the slice is encoded as exactly one packet
/// and serialized to the sink before the call returns. Nothing is buffered
/// between calls, and no dictionary is carried from one packet to the next.
///
/// Wrap the sink in a `BufWriter` if it is unbuffered; wrap the `Writer` in
/// one only if many tiny packets are acceptable.
pub struct Writer<W: Write> {
    sink: W,
    codec: PacketCodec,
    packet: Packet,
    config: WriterConfig,
    packets_written: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(sink: W, transform: Box<dyn BlockTransform>) -> Self {
        Self::with_config(sink, transform, WriterConfig::default())
    }

    pub fn with_config(sink: W, transform: Box<dyn BlockTransform>, config: WriterConfig) -> Self {
        Self {
            sink,
            codec: PacketCodec::with_policy(transform, config.entropy),
            packet: Packet::default(),
            config,
            packets_written: 0,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Number of packets written since construction or the last reset.
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Encode `data` as one packet and write it to the sink.
    ///
    /// Returns `data.len()`: the logical unit was accepted in full.
    pub fn write_packet(&mut self, data: &[u8]) -> Result<usize> {
        self.codec.encode(data, self.config.mode, &mut self.packet)?;
        write_packet(&mut self.sink, &self.packet)?;
        self.packets_written += 1;
        Ok(data.len())
    }

    /// Rebind to a new sink and forget all entropy state.
    pub fn reset(&mut self, sink: W) -> W {
        debug!(packets = self.packets_written, "writer reset");
        self.codec.reset();
        self.packet.clear();
        self.packets_written = 0;
        std::mem::replace(&mut self.sink, sink)
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Flush the sink and return it.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_packet(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
