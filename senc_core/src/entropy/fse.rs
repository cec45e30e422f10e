//! Finite State Entropy (tANS) primitive.
//!
//! Each compressed stream is self-describing:
//!
//! ```text
//! [table_log: u8][max_symbol: u8][counts ...]
//! [initial_state: u16 LE][decoded_len: u32 LE][bitstream ...]
//! ```
//!
//! `counts` holds the normalized count of every symbol up to `max_symbol` as
//! a LEB128 varint. A zero count is followed by one byte giving how many of
//! the next symbols are zero as well, so absent symbols cost almost nothing.
//!
//! The encoder walks the input backwards starting from state 0, so a
//! well-formed stream always leaves the decoder in state 0. Decoding checks
//! that, together with the bit budget, to reject corrupt input.

use thiserror::Error;

use super::bits::{BitReader, BitWriter};
use super::{highest_bit, Histogram, MAX_STREAM_LEN};

/// Default (and maximum requested) table log: 2048 states.
pub const DEFAULT_TABLE_LOG: u8 = 11;

/// Smallest table log accepted on either side.
pub const MIN_TABLE_LOG: u8 = 5;

/// Largest table log accepted on either side.
pub const MAX_TABLE_LOG: u8 = 12;

/// table_log + max_symbol + initial_state + decoded_len.
const FIXED_HEADER_LEN: usize = 1 + 1 + 2 + 4;

/// Status and failure conditions reported by the FSE primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FseError {
    /// Entropy coding would not shrink the input.
    #[error("input is incompressible")]
    Incompressible,

    /// The input is one repeated symbol.
    #[error("input is a single repeated symbol")]
    UseRle,

    #[error("table log {0} out of range")]
    TableLog(u8),

    #[error("corrupted stream: {0}")]
    Corrupted(&'static str),
}

#[derive(Debug, Clone, Copy, Default)]
struct DecodeEntry {
    symbol: u8,
    bits: u8,
    next_state_base: u16,
}

/// Reusable FSE working memory: histogram, normalized counts, tables, and
/// the decode output buffer.
#[derive(Debug, Clone)]
pub struct Scratch {
    /// Upper bound on the table log chosen by the encoder.
    table_log: u8,
    hist: Histogram,
    norm: [u16; 256],
    cumul: [u32; 256],
    decode: Vec<DecodeEntry>,
    state_table: Vec<u16>,
    chunks: Vec<(u16, u8)>,
    out: Vec<u8>,
}

impl Default for Scratch {
    fn default() -> Self {
        Self {
            table_log: DEFAULT_TABLE_LOG,
            hist: Histogram::default(),
            norm: [0; 256],
            cumul: [0; 256],
            decode: Vec::new(),
            state_table: Vec::new(),
            chunks: Vec::new(),
            out: Vec::new(),
        }
    }
}

impl Scratch {
    /// Scratch whose encoder never picks a table log above `table_log`.
    pub fn with_table_log(table_log: u8) -> Result<Self, FseError> {
        if !(MIN_TABLE_LOG..=MAX_TABLE_LOG).contains(&table_log) {
            return Err(FseError::TableLog(table_log));
        }
        Ok(Self {
            table_log,
            ..Self::default()
        })
    }

    pub fn table_log(&self) -> u8 {
        self.table_log
    }

    /// Pick the table log for `len` input bytes with `distinct` symbols.
    fn optimal_table_log(&self, len: usize, distinct: usize) -> u8 {
        let from_len = highest_bit(len - 1).saturating_sub(2);
        let mut log = self.table_log.min(from_len).max(MIN_TABLE_LOG);
        while (1usize << log) < distinct {
            log += 1;
        }
        log.min(MAX_TABLE_LOG)
    }

    /// Scale the histogram so the counts sum to exactly `1 << log`. Every
    /// present symbol keeps at least one slot.
    fn normalize(&mut self, log: u8, total: usize) {
        let table_size = 1u64 << log;
        self.norm = [0; 256];

        let mut present: Vec<usize> = (0..=self.hist.max_symbol as usize)
            .filter(|&s| self.hist.counts[s] > 0)
            .collect();
        present.sort_by(|&a, &b| self.hist.counts[b].cmp(&self.hist.counts[a]));

        let mut distributed = 0i64;
        for &s in &present {
            let scaled = ((self.hist.counts[s] as u64 * table_size) / total as u64).max(1);
            self.norm[s] = scaled as u16;
            distributed += scaled as i64;
        }

        let mut diff = table_size as i64 - distributed;
        let mut idx = 0;
        while diff > 0 {
            self.norm[present[idx % present.len()]] += 1;
            diff -= 1;
            idx += 1;
        }
        while diff < 0 {
            let s = present[idx % present.len()];
            if self.norm[s] > 1 {
                self.norm[s] -= 1;
                diff += 1;
            }
            idx += 1;
        }
    }

    /// Spread symbols over the state table and derive both the decode table
    /// and the encoder's state transition table from `self.norm`.
    fn build_tables(&mut self, log: u8, max_symbol: u8) -> Result<(), FseError> {
        let table_size = 1usize << log;
        let mask = table_size - 1;
        let step = (table_size >> 1) + (table_size >> 3) + 3;

        let mut spread = vec![0u8; table_size];
        let mut pos = 0usize;
        let mut placed = 0usize;
        let mut cumul = 0u32;
        for s in 0..=max_symbol as usize {
            self.cumul[s] = cumul;
            cumul += self.norm[s] as u32;
            for _ in 0..self.norm[s] {
                spread[pos] = s as u8;
                pos = (pos + step) & mask;
                placed += 1;
            }
        }
        if placed != table_size {
            return Err(FseError::Corrupted("normalized counts do not fill the table"));
        }

        self.decode.clear();
        self.decode.resize(table_size, DecodeEntry::default());
        self.state_table.clear();
        self.state_table.resize(table_size, 0);

        let mut next = self.norm;
        for (state, &symbol) in spread.iter().enumerate() {
            let s = symbol as usize;
            let x = next[s] as usize;
            next[s] += 1;
            let bits = log - highest_bit(x);
            let next_state_base = (x << bits) - table_size;
            self.decode[state] = DecodeEntry {
                symbol,
                bits,
                next_state_base: next_state_base as u16,
            };
            let occurrence = x - self.norm[s] as usize;
            self.state_table[self.cumul[s] as usize + occurrence] = state as u16;
        }
        Ok(())
    }
}

fn push_varint(out: &mut Vec<u8>, mut value: u16) {
    while value >= 0x80 {
        out.push(value as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(input: &[u8], pos: &mut usize) -> Result<u16, FseError> {
    let mut value = 0u32;
    for shift in [0, 7, 14] {
        let byte = *input
            .get(*pos)
            .ok_or(FseError::Corrupted("truncated header"))?;
        *pos += 1;
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return u16::try_from(value).map_err(|_| FseError::Corrupted("count out of range"));
        }
    }
    Err(FseError::Corrupted("count out of range"))
}

fn write_counts(norm: &[u16], out: &mut Vec<u8>) {
    let mut s = 0usize;
    while s < norm.len() {
        let n = norm[s];
        push_varint(out, n);
        s += 1;
        if n == 0 {
            let run = norm[s..].iter().take(255).take_while(|&&c| c == 0).count();
            out.push(run as u8);
            s += run;
        }
    }
}

/// Parse counts for symbols `0..=max_symbol` into `norm` (zeroed by the
/// caller). Returns the number of header bytes consumed.
fn read_counts(input: &[u8], max_symbol: u8, norm: &mut [u16; 256]) -> Result<usize, FseError> {
    let symbols = max_symbol as usize + 1;
    let mut pos = 0usize;
    let mut s = 0usize;
    while s < symbols {
        let n = read_varint(input, &mut pos)?;
        norm[s] = n;
        s += 1;
        if n == 0 {
            let run = *input
                .get(pos)
                .ok_or(FseError::Corrupted("truncated header"))? as usize;
            pos += 1;
            if s + run > symbols {
                return Err(FseError::Corrupted("zero run past max symbol"));
            }
            s += run;
        }
    }
    Ok(pos)
}

/// Compress `input` into `out` (cleared first).
///
/// Returns [`FseError::Incompressible`] or [`FseError::UseRle`] when the
/// caller should store the input some other way; `out` is left empty then.
pub fn compress(input: &[u8], scratch: &mut Scratch, out: &mut Vec<u8>) -> Result<(), FseError> {
    out.clear();
    if input.len() <= 1 || input.len() > MAX_STREAM_LEN {
        return Err(FseError::Incompressible);
    }

    scratch.hist.count(input);
    let max_count = scratch.hist.max_count as usize;
    if max_count == input.len() {
        return Err(FseError::UseRle);
    }
    if max_count == 1 || max_count < (input.len() >> 7) {
        return Err(FseError::Incompressible);
    }

    let log = scratch.optimal_table_log(input.len(), scratch.hist.distinct);
    let max_symbol = scratch.hist.max_symbol;
    scratch.normalize(log, input.len());
    scratch.build_tables(log, max_symbol)?;

    let table_size = 1usize << log;
    scratch.chunks.clear();
    let mut state = 0usize;
    for &byte in input.iter().rev() {
        let s = byte as usize;
        let freq = scratch.norm[s] as usize;
        let widened = state + table_size;
        let mut bits = log - highest_bit(freq);
        if (widened >> bits) < freq {
            bits -= 1;
        }
        let x = widened >> bits;
        let value = widened & ((1usize << bits) - 1);
        scratch.chunks.push((value as u16, bits));
        state = scratch.state_table[scratch.cumul[s] as usize + x - freq] as usize;
    }

    out.reserve(FIXED_HEADER_LEN + 2 * (max_symbol as usize + 1) + input.len());
    out.push(log);
    out.push(max_symbol);
    write_counts(&scratch.norm[..=max_symbol as usize], out);
    out.extend_from_slice(&(state as u16).to_le_bytes());
    out.extend_from_slice(&(input.len() as u32).to_le_bytes());

    let mut writer = BitWriter::new(out);
    for &(value, bits) in scratch.chunks.iter().rev() {
        writer.write_bits(value as u32, bits as u32);
    }
    writer.finish();

    if out.len() >= input.len() {
        out.clear();
        return Err(FseError::Incompressible);
    }
    Ok(())
}

/// Decompress a stream produced by [`compress`]. The returned slice borrows
/// the scratch output buffer and is valid until the next call.
///
/// Streams claiming more than `limit` decoded bytes are rejected before any
/// output is produced.
pub fn decompress<'s>(
    input: &[u8],
    scratch: &'s mut Scratch,
    limit: usize,
) -> Result<&'s [u8], FseError> {
    if input.len() < 2 {
        return Err(FseError::Corrupted("truncated header"));
    }
    let log = input[0];
    if !(MIN_TABLE_LOG..=MAX_TABLE_LOG).contains(&log) {
        return Err(FseError::TableLog(log));
    }
    let max_symbol = input[1];

    scratch.norm = [0; 256];
    let counts_end = 2 + read_counts(&input[2..], max_symbol, &mut scratch.norm)?;
    let header_end = counts_end + 6;
    if input.len() < header_end {
        return Err(FseError::Corrupted("truncated header"));
    }

    let table_size = 1usize << log;
    let counts = &scratch.norm[..=max_symbol as usize];
    if counts.iter().map(|&n| n as u32).sum::<u32>() != table_size as u32 {
        return Err(FseError::Corrupted("normalized counts do not sum to table size"));
    }
    // One symbol owning every state decodes without reading a bit; the
    // encoder reports such input as RLE instead.
    if counts.iter().any(|&n| n as usize == table_size) {
        return Err(FseError::Corrupted("single-symbol table"));
    }

    let initial_state = u16::from_le_bytes([input[counts_end], input[counts_end + 1]]) as usize;
    let decoded_len = u32::from_le_bytes([
        input[counts_end + 2],
        input[counts_end + 3],
        input[counts_end + 4],
        input[counts_end + 5],
    ]) as usize;
    if initial_state >= table_size {
        return Err(FseError::Corrupted("initial state out of range"));
    }
    if decoded_len > MAX_STREAM_LEN.min(limit) {
        return Err(FseError::Corrupted("decoded length too large"));
    }

    scratch.build_tables(log, max_symbol)?;

    let payload = &input[header_end..];
    scratch.out.clear();
    scratch.out.reserve(decoded_len.min(payload.len().saturating_mul(8)));
    let mut reader = BitReader::new(payload);
    let mut state = initial_state;
    for _ in 0..decoded_len {
        let entry = scratch.decode[state];
        scratch.out.push(entry.symbol);
        state = entry.next_state_base as usize + reader.read_bits(entry.bits as u32) as usize;
        if reader.overrun() {
            return Err(FseError::Corrupted("bitstream overrun"));
        }
    }

    if state != 0 {
        return Err(FseError::Corrupted("final state mismatch"));
    }
    Ok(&scratch.out)
}
