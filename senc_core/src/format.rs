//! Wire format: one packet per record, records back to back.
//!
//! Each record is the bincode encoding (varint integers, little endian) of
//! [`Packet`]:
//!
//! ```text
//! command_tag: u8
//! literal_tag: u8
//! command_data: len-prefixed bytes
//! literal_data: len-prefixed bytes
//! original_length: varint u64
//! ```
//!
//! There is no magic number or version field; a packet is decodable on its
//! own given only this layout.

use std::io::{BufRead, ErrorKind, Write};

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::entropy::EntropyTag;
use crate::error::{Error, Result};

/// Default upper bound on a single serialized frame: 256 MiB.
pub const DEFAULT_MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

/// Default upper bound on the decoded payload of one packet: 256 MiB.
pub const DEFAULT_MAX_PAYLOAD_LEN: u64 = 256 * 1024 * 1024;

/// One self-contained encoded unit.
///
/// Tags are kept as raw bytes so a frame with an unknown tag still parses;
/// it is rejected when the packet is decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub command_tag: u8,
    pub literal_tag: u8,
    pub command_data: Vec<u8>,
    pub literal_data: Vec<u8>,
    /// Exact byte length of the payload this packet decodes to.
    pub original_length: u64,
}

impl Packet {
    /// Empty the packet, keeping buffer capacity for reuse.
    pub fn clear(&mut self) {
        self.command_tag = EntropyTag::Raw.as_u8();
        self.literal_tag = EntropyTag::Raw.as_u8();
        self.command_data.clear();
        self.literal_data.clear();
        self.original_length = 0;
    }

    /// Bytes of substream payload carried by this packet.
    pub fn encoded_len(&self) -> usize {
        self.command_data.len() + self.literal_data.len()
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
}

/// Serialize `packet` as one frame.
pub fn write_packet<W: Write + ?Sized>(sink: &mut W, packet: &Packet) -> Result<()> {
    wire_options()
        .serialize_into(sink, packet)
        .map_err(Error::frame_encode)
}

/// Serialized size of `packet` in bytes.
pub fn frame_len(packet: &Packet) -> Result<u64> {
    wire_options()
        .serialized_size(packet)
        .map_err(Error::frame_encode)
}

/// Deserialize the next frame into `packet`.
///
/// A source that is exhausted exactly at a frame boundary yields
/// [`Error::EndOfStream`]; one that ends inside a frame is a
/// [`Error::FrameDecode`]. Frames longer than `max_frame_len` are rejected
/// before their payload is allocated.
pub fn read_packet<R: BufRead + ?Sized>(
    source: &mut R,
    packet: &mut Packet,
    max_frame_len: u64,
) -> Result<()> {
    loop {
        match source.fill_buf() {
            Ok(buf) if buf.is_empty() => return Err(Error::EndOfStream),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    *packet = wire_options()
        .with_limit(max_frame_len)
        .deserialize_from(source)
        .map_err(Error::frame_decode)?;
    Ok(())
}
