use std::io::{self, BufReader, Read};
use std::ops::Range;

use tracing::warn;

use crate::codec::{BlockTransform, PacketCodec};
use crate::entropy::EntropyPolicy;
use crate::error::{Error, Result};
use crate::format::{read_packet, Packet, DEFAULT_MAX_FRAME_LEN, DEFAULT_MAX_PAYLOAD_LEN};

/// Decoding knobs for a [`Reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Largest serialized frame accepted from the source.
    pub max_frame_len: u64,
    /// Largest decoded payload accepted from one packet. Checked against the
    /// packet's claimed length before any output buffer grows.
    pub max_payload_len: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

/// Streaming reader that reassembles the payloads of a packet stream.
///
/// # Read contract
/// Decoded packets are served in order as one continuous byte stream; read
/// buffers need not line up with packet boundaries. Whatever does not fit
/// into the caller's buffer is kept and served first on the next call.
///
/// # Failure is sticky
/// The first failure (including the clean end of the source) is recorded
/// and the source is never touched again:
/// - end of source reads as `Ok(0)` on every later call;
/// - any other failure is returned as `Err` on every later call, always
///   with the same `io::ErrorKind`.
///
/// Bytes already copied when the failure happened are returned first.
pub struct Reader<R: Read> {
    source: BufReader<R>,
    codec: PacketCodec,
    packet: Packet,
    /// Undelivered part of the codec's last decoded output.
    rest: Range<usize>,
    error: Option<Error>,
    config: ReaderConfig,
    packets_read: u64,
}

impl<R: Read> Reader<R> {
    pub fn new(source: R, transform: Box<dyn BlockTransform>) -> Self {
        Self::with_config(source, transform, ReaderConfig::default())
    }

    pub fn with_config(source: R, transform: Box<dyn BlockTransform>, config: ReaderConfig) -> Self {
        // Decoding accepts every tag whatever the policy.
        let mut codec = PacketCodec::with_policy(transform, EntropyPolicy::default());
        codec.set_max_payload_len(config.max_payload_len);
        Self {
            source: BufReader::new(source),
            codec,
            packet: Packet::default(),
            rest: 0..0,
            error: None,
            config,
            packets_read: 0,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Number of packets decoded since construction or the last reset.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// The recorded terminal condition, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Rebind to a new source. Buffered output, the sticky error, and all
    /// entropy state are dropped.
    pub fn reset(&mut self, source: R) {
        self.source = BufReader::new(source);
        self.codec.reset();
        self.packet.clear();
        self.rest = 0..0;
        self.error = None;
        self.packets_read = 0;
    }

    pub fn get_ref(&self) -> &R {
        self.source.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.source.get_mut()
    }

    /// Return the source. Bytes the reader had buffered from it are lost.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Bytes decoded but not yet delivered.
    pub fn pending(&self) -> usize {
        self.rest.len()
    }

    /// Read and decode the next packet. Its whole payload becomes `rest`.
    fn next_packet(&mut self) -> Result<()> {
        read_packet(&mut self.source, &mut self.packet, self.config.max_frame_len)?;
        let decoded = self.codec.decode(&self.packet)?;
        self.rest = 0..decoded.len();
        self.packets_read += 1;
        Ok(())
    }

    /// Copy as much of `rest` as fits into `buf`.
    fn drain_rest(&mut self, buf: &mut [u8]) -> usize {
        let n = self.rest.len().min(buf.len());
        if n > 0 {
            let start = self.rest.start;
            buf[..n].copy_from_slice(&self.codec.last_output()[start..start + n]);
            self.rest.start += n;
        }
        n
    }

    fn fail(&mut self, err: Error) {
        if !err.is_end_of_stream() {
            warn!(
                category = err.category(),
                packets = self.packets_read,
                error = %err,
                "packet stream failed"
            );
        }
        self.error = Some(err);
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = self.drain_rest(buf);
        while filled < buf.len() {
            if let Some(err) = &self.error {
                if filled > 0 {
                    return Ok(filled);
                }
                return match err {
                    Error::EndOfStream => Ok(0),
                    other => Err(other.to_io()),
                };
            }
            if let Err(err) = self.next_packet() {
                self.fail(err);
                continue;
            }
            filled += self.drain_rest(&mut buf[filled..]);
        }
        Ok(filled)
    }
}
