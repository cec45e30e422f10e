//! Per-substream adaptive entropy coding.
//!
//! [`EntropyCoder`] decides, per call, whether a substream is worth entropy
//! coding. The decision travels on the wire as an [`EntropyTag`] so decoding
//! never has to re-derive it.

mod bits;
pub mod fse;
pub mod huffman;

use tracing::debug;

use crate::error::{Error, PrimitiveError, Result};

/// Longest substream either primitive will encode or accept on decode.
pub const MAX_STREAM_LEN: usize = 1 << 30;

/// Wire value identifying how a substream is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntropyTag {
    /// Stored verbatim.
    Raw = 0,
    /// Finite State Entropy.
    Fse = 1,
    /// Huffman; only emitted under [`EntropyPolicy::Smallest`].
    Huffman = 2,
}

impl EntropyTag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            EntropyTag::Raw => "raw",
            EntropyTag::Fse => "fse",
            EntropyTag::Huffman => "huffman",
        }
    }
}

impl TryFrom<u8> for EntropyTag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(EntropyTag::Raw),
            1 => Ok(EntropyTag::Fse),
            2 => Ok(EntropyTag::Huffman),
            other => Err(Error::UnknownEntropyTag(other)),
        }
    }
}

/// Which coders the encoder is allowed to try.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntropyPolicy {
    /// FSE, falling back to raw.
    #[default]
    FseOnly,
    /// FSE and Huffman; the smaller output wins, raw if neither helps.
    Smallest,
}

/// Byte histogram shared by both primitives.
#[derive(Debug, Clone)]
pub(crate) struct Histogram {
    pub(crate) counts: [u32; 256],
    pub(crate) max_symbol: u8,
    pub(crate) max_count: u32,
    pub(crate) distinct: usize,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: [0; 256],
            max_symbol: 0,
            max_count: 0,
            distinct: 0,
        }
    }
}

impl Histogram {
    pub(crate) fn count(&mut self, input: &[u8]) {
        self.counts = [0; 256];
        for &b in input {
            self.counts[b as usize] += 1;
        }
        self.max_symbol = 0;
        self.max_count = 0;
        self.distinct = 0;
        for (s, &c) in self.counts.iter().enumerate() {
            if c > 0 {
                self.max_symbol = s as u8;
                self.max_count = self.max_count.max(c);
                self.distinct += 1;
            }
        }
    }
}

/// Floor of log2 for a positive integer.
#[inline]
pub(crate) fn highest_bit(x: usize) -> u8 {
    debug_assert!(x > 0);
    (usize::BITS - 1 - x.leading_zeros()) as u8
}

/// Adaptive coder for one substream, owning the primitives' scratch state.
#[derive(Debug, Clone, Default)]
pub struct EntropyCoder {
    policy: EntropyPolicy,
    fse: fse::Scratch,
    huff: huffman::Scratch,
    alt: Vec<u8>,
}

impl EntropyCoder {
    pub fn new(policy: EntropyPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> EntropyPolicy {
        self.policy
    }

    /// Encode `raw` into `out` (cleared first) and return the tag describing
    /// what was written. Incompressible and single-symbol input is stored
    /// raw; run-length coding is not implemented, so the RLE signal takes
    /// the same path.
    pub fn encode(&mut self, raw: &[u8], out: &mut Vec<u8>) -> Result<EntropyTag> {
        let mut tag = match fse::compress(raw, &mut self.fse, out) {
            Ok(()) => EntropyTag::Fse,
            Err(fse::FseError::Incompressible | fse::FseError::UseRle) => EntropyTag::Raw,
            Err(e) => return Err(Error::EntropyEncode(PrimitiveError::Fse(e))),
        };

        if self.policy == EntropyPolicy::Smallest {
            match huffman::compress(raw, &mut self.huff, &mut self.alt) {
                Ok(()) if tag == EntropyTag::Raw || self.alt.len() < out.len() => {
                    std::mem::swap(out, &mut self.alt);
                    tag = EntropyTag::Huffman;
                }
                Ok(()) | Err(huffman::HuffError::Incompressible | huffman::HuffError::UseRle) => {}
                Err(e) => return Err(Error::EntropyEncode(PrimitiveError::Huffman(e))),
            }
        }

        if tag == EntropyTag::Raw {
            debug!(len = raw.len(), "substream stored raw");
            out.clear();
            out.extend_from_slice(raw);
        }
        Ok(tag)
    }

    /// Decode one substream. Raw data is returned as-is; coded data is
    /// decoded into scratch memory that stays borrowed until the next call.
    ///
    /// A coded stream claiming more than `limit` bytes is rejected before
    /// it is decoded.
    pub fn decode<'a>(&'a mut self, tag: u8, data: &'a [u8], limit: usize) -> Result<&'a [u8]> {
        match EntropyTag::try_from(tag)? {
            EntropyTag::Raw => Ok(data),
            EntropyTag::Fse => fse::decompress(data, &mut self.fse, limit)
                .map_err(|e| Error::EntropyDecode(PrimitiveError::Fse(e))),
            EntropyTag::Huffman => huffman::decompress(data, &mut self.huff, limit)
                .map_err(|e| Error::EntropyDecode(PrimitiveError::Huffman(e))),
        }
    }

    /// Drop all table state for a fresh, unrelated stream. The policy is a
    /// configuration choice and survives.
    pub fn reset(&mut self) {
        self.fse = fse::Scratch::default();
        self.huff = huffman::Scratch::default();
        self.alt = Vec::new();
    }
}
