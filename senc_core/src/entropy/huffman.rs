//! Canonical, length-limited Huffman primitive (single stream).
//!
//! ```text
//! [max_symbol: u8][code lengths: 4 bits × (max_symbol + 1), low nibble first]
//! [decoded_len: u32 LE][bitstream ...]
//! ```
//!
//! Codes are assigned canonically from the lengths and written bit-reversed
//! into an LSB-first stream, so the decoder resolves a symbol with a single
//! table lookup on the next `max_len` bits.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use thiserror::Error;

use super::bits::{BitReader, BitWriter};
use super::{Histogram, MAX_STREAM_LEN};

/// Longest code the encoder will emit.
pub const MAX_CODE_LEN: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HuffError {
    #[error("input is incompressible")]
    Incompressible,

    #[error("input is a single repeated symbol")]
    UseRle,

    #[error("corrupted stream: {0}")]
    Corrupted(&'static str),
}

#[derive(Debug, Clone, Copy, Default)]
struct DecodeEntry {
    symbol: u8,
    len: u8,
}

/// Reusable Huffman working memory.
#[derive(Debug, Clone)]
pub struct Scratch {
    hist: Histogram,
    lengths: [u8; 256],
    codes: [u16; 256],
    table: Vec<DecodeEntry>,
    out: Vec<u8>,
}

impl Default for Scratch {
    fn default() -> Self {
        Self {
            hist: Histogram::default(),
            lengths: [0; 256],
            codes: [0; 256],
            table: Vec::new(),
            out: Vec::new(),
        }
    }
}

impl Scratch {
    /// Compute code lengths from the histogram, halving the weights until
    /// no code is longer than [`MAX_CODE_LEN`].
    fn build_lengths(&mut self) {
        let mut weights = self.hist.counts;
        loop {
            let max_len = huffman_lengths(&weights, self.hist.max_symbol, &mut self.lengths);
            if max_len <= MAX_CODE_LEN {
                return;
            }
            for w in weights.iter_mut().filter(|w| **w > 0) {
                *w = (*w + 1) >> 1;
            }
        }
    }

    /// Assign canonical codes for the current lengths. Returns the longest
    /// code length, or an error if the lengths do not form a complete code.
    fn assign_codes(&mut self, max_symbol: u8) -> Result<u8, HuffError> {
        let mut order: Vec<usize> = (0..=max_symbol as usize)
            .filter(|&s| self.lengths[s] > 0)
            .collect();
        if order.len() < 2 {
            return Err(HuffError::Corrupted("fewer than two coded symbols"));
        }
        order.sort_by_key(|&s| (self.lengths[s], s));

        let max_len = self.lengths[order[order.len() - 1]];
        let kraft: u32 = order.iter().map(|&s| 1u32 << (max_len - self.lengths[s])).sum();
        if kraft != 1u32 << max_len {
            return Err(HuffError::Corrupted("code lengths are not a complete prefix code"));
        }

        let mut code = 0u32;
        let mut prev_len = self.lengths[order[0]];
        for &s in &order {
            let len = self.lengths[s];
            code <<= len - prev_len;
            self.codes[s] = reverse_bits(code, len);
            code += 1;
            prev_len = len;
        }
        Ok(max_len)
    }
}

fn reverse_bits(code: u32, len: u8) -> u16 {
    (code.reverse_bits() >> (32 - len as u32)) as u16
}

/// Plain Huffman construction over `weights[..=max_symbol]`; writes the
/// depth of each present symbol into `lengths` and returns the deepest one.
fn huffman_lengths(weights: &[u32; 256], max_symbol: u8, lengths: &mut [u8; 256]) -> u8 {
    *lengths = [0; 256];
    let symbols: Vec<usize> = (0..=max_symbol as usize).filter(|&s| weights[s] > 0).collect();
    let n = symbols.len();

    let mut parent = vec![0usize; 2 * n - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = symbols
        .iter()
        .enumerate()
        .map(|(node, &s)| Reverse((weights[s] as u64, node)))
        .collect();

    let mut next = n;
    while let (Some(Reverse((w1, a))), Some(Reverse((w2, b)))) = (heap.pop(), heap.pop()) {
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((w1 + w2, next)));
        next += 1;
    }

    // Parents always have larger ids than their children, so walking ids
    // downwards from the root resolves every depth in one pass.
    let root = 2 * n - 2;
    let mut depth = vec![0u8; 2 * n - 1];
    for node in (0..root).rev() {
        depth[node] = depth[parent[node]] + 1;
    }

    let mut max_len = 0u8;
    for (node, &s) in symbols.iter().enumerate() {
        lengths[s] = depth[node];
        max_len = max_len.max(depth[node]);
    }
    max_len
}

/// Compress `input` into `out` (cleared first).
pub fn compress(input: &[u8], scratch: &mut Scratch, out: &mut Vec<u8>) -> Result<(), HuffError> {
    out.clear();
    if input.len() <= 1 || input.len() > MAX_STREAM_LEN {
        return Err(HuffError::Incompressible);
    }
    scratch.hist.count(input);
    if scratch.hist.max_count as usize == input.len() {
        return Err(HuffError::UseRle);
    }
    if scratch.hist.max_count == 1 {
        return Err(HuffError::Incompressible);
    }

    let max_symbol = scratch.hist.max_symbol;
    scratch.build_lengths();
    scratch.assign_codes(max_symbol)?;

    out.push(max_symbol);
    for pair in scratch.lengths[..=max_symbol as usize].chunks(2) {
        let high = pair.get(1).copied().unwrap_or(0);
        out.push(pair[0] | (high << 4));
    }
    out.extend_from_slice(&(input.len() as u32).to_le_bytes());

    let mut writer = BitWriter::new(out);
    for &byte in input {
        let s = byte as usize;
        writer.write_bits(scratch.codes[s] as u32, scratch.lengths[s] as u32);
    }
    writer.finish();

    if out.len() >= input.len() {
        out.clear();
        return Err(HuffError::Incompressible);
    }
    Ok(())
}

/// Decompress a stream produced by [`compress`]. The returned slice borrows
/// the scratch output buffer and is valid until the next call. Streams
/// claiming more than `limit` decoded bytes are rejected.
pub fn decompress<'s>(
    input: &[u8],
    scratch: &'s mut Scratch,
    limit: usize,
) -> Result<&'s [u8], HuffError> {
    let Some(&max_symbol) = input.first() else {
        return Err(HuffError::Corrupted("truncated header"));
    };
    let symbol_count = max_symbol as usize + 1;
    let lengths_end = 1 + symbol_count.div_ceil(2);
    let header_end = lengths_end + 4;
    if input.len() < header_end {
        return Err(HuffError::Corrupted("truncated header"));
    }

    scratch.lengths = [0; 256];
    for (s, len) in scratch.lengths[..symbol_count].iter_mut().enumerate() {
        let packed = input[1 + s / 2];
        *len = if s % 2 == 0 { packed & 0x0f } else { packed >> 4 };
        if *len > MAX_CODE_LEN {
            return Err(HuffError::Corrupted("code length too long"));
        }
    }
    let decoded_len = u32::from_le_bytes([
        input[lengths_end],
        input[lengths_end + 1],
        input[lengths_end + 2],
        input[lengths_end + 3],
    ]) as usize;
    if decoded_len > MAX_STREAM_LEN.min(limit) {
        return Err(HuffError::Corrupted("decoded length too large"));
    }

    let max_len = scratch.assign_codes(max_symbol)?;
    scratch.table.clear();
    scratch.table.resize(1 << max_len, DecodeEntry::default());
    for s in 0..symbol_count {
        let len = scratch.lengths[s];
        if len == 0 {
            continue;
        }
        let code = scratch.codes[s] as usize;
        for fill in 0..(1usize << (max_len - len)) {
            scratch.table[code | (fill << len)] = DecodeEntry {
                symbol: s as u8,
                len,
            };
        }
    }

    let payload = &input[header_end..];
    // Every code is at least one bit long.
    if decoded_len > payload.len().saturating_mul(8) {
        return Err(HuffError::Corrupted("decoded length exceeds bitstream"));
    }
    scratch.out.clear();
    scratch.out.reserve(decoded_len);
    let mut reader = BitReader::new(payload);
    for _ in 0..decoded_len {
        let entry = scratch.table[reader.peek_bits(max_len as u32) as usize];
        scratch.out.push(entry.symbol);
        reader.consume(entry.len as u32);
    }
    if reader.overrun() {
        return Err(HuffError::Corrupted("bitstream overrun"));
    }
    Ok(&scratch.out)
}
