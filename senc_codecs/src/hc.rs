//! Hash-chain match finder producing standard LZ4 blocks.
//!
//! Every position is linked to the previous position with the same 4-byte
//! hash. The search walks that chain up to a level-dependent depth and keeps
//! the longest match; one step of lazy evaluation defers a match when the
//! next position offers a longer one. Positions are inserted only once the
//! cursor has moved past them, so a chain never points at or after the
//! position being searched.

/// Shortest match the LZ4 format can express.
const MIN_MATCH: usize = 4;
/// The last 5 bytes of a block are always literals.
const LAST_LITERALS: usize = 5;
/// No match may start within the last 12 bytes of a block.
const MFLIMIT: usize = 12;
/// Largest encodable offset.
const MAX_DISTANCE: usize = 65_535;

const HASH_LOG: u32 = 16;
const CHAIN_SIZE: usize = 1 << 16;

/// Highest level; also the default.
pub const MAX_LEVEL: u8 = 9;

/// Chain search depth per level (index 0 unused).
const CHAIN_DEPTHS: [usize; 10] = [0, 1, 2, 4, 8, 16, 32, 64, 128, 256];

#[inline]
fn hash4(input: &[u8], pos: usize) -> usize {
    let v = u32::from_le_bytes([input[pos], input[pos + 1], input[pos + 2], input[pos + 3]]);
    (v.wrapping_mul(2_654_435_761) >> (32 - HASH_LOG)) as usize
}

/// Length of the common run at `a` and `b` (`a < b`), not extending past `limit`.
#[inline]
fn common_len(input: &[u8], a: usize, b: usize, limit: usize) -> usize {
    input[b..limit]
        .iter()
        .zip(&input[a..])
        .take_while(|(x, y)| x == y)
        .count()
}

fn push_length(out: &mut Vec<u8>, mut n: usize) {
    while n >= 255 {
        out.push(255);
        n -= 255;
    }
    out.push(n as u8);
}

fn write_sequence(out: &mut Vec<u8>, literals: &[u8], offset: usize, match_len: usize) {
    let ll = literals.len();
    let ml = match_len - MIN_MATCH;
    out.push(((ll.min(15) << 4) | ml.min(15)) as u8);
    if ll >= 15 {
        push_length(out, ll - 15);
    }
    out.extend_from_slice(literals);
    out.extend_from_slice(&(offset as u16).to_le_bytes());
    if ml >= 15 {
        push_length(out, ml - 15);
    }
}

fn write_last_literals(out: &mut Vec<u8>, literals: &[u8]) {
    let ll = literals.len();
    out.push((ll.min(15) << 4) as u8);
    if ll >= 15 {
        push_length(out, ll - 15);
    }
    out.extend_from_slice(literals);
}

/// Reusable HC state. Tables are allocated on first use.
#[derive(Debug, Clone)]
pub(crate) struct HcCompressor {
    /// Most recent position + 1 per hash; 0 is empty.
    head: Vec<u32>,
    /// Previous position + 1 with the same hash, indexed by position.
    chain: Vec<u32>,
    next_insert: usize,
    max_chain: usize,
    level: u8,
}

impl HcCompressor {
    /// `level` is clamped to `1..=MAX_LEVEL`.
    pub(crate) fn new(level: u8) -> Self {
        let level = level.clamp(1, MAX_LEVEL);
        Self {
            head: Vec::new(),
            chain: Vec::new(),
            next_insert: 0,
            max_chain: CHAIN_DEPTHS[level as usize],
            level,
        }
    }

    pub(crate) fn level(&self) -> u8 {
        self.level
    }

    fn prepare(&mut self) {
        self.head.clear();
        self.head.resize(1 << HASH_LOG, 0);
        self.chain.clear();
        self.chain.resize(CHAIN_SIZE, 0);
        self.next_insert = 0;
    }

    fn insert_up_to(&mut self, input: &[u8], target: usize) {
        while self.next_insert < target {
            let pos = self.next_insert;
            let h = hash4(input, pos);
            self.chain[pos & (CHAIN_SIZE - 1)] = self.head[h];
            self.head[h] = pos as u32 + 1;
            self.next_insert += 1;
        }
    }

    /// Longest match for `pos` as `(offset, length)`.
    fn find_match(&mut self, input: &[u8], pos: usize, limit: usize) -> Option<(usize, usize)> {
        self.insert_up_to(input, pos);

        let mut best = (0, MIN_MATCH - 1);
        let mut link = self.head[hash4(input, pos)];
        let mut depth = 0;
        while link != 0 && depth < self.max_chain {
            let cand = link as usize - 1;
            if pos - cand > MAX_DISTANCE {
                break;
            }
            if input[cand..cand + MIN_MATCH] == input[pos..pos + MIN_MATCH] {
                let len = MIN_MATCH + common_len(input, cand + MIN_MATCH, pos + MIN_MATCH, limit);
                if len > best.1 {
                    best = (pos - cand, len);
                    if pos + len == limit {
                        break;
                    }
                }
            }
            link = self.chain[cand & (CHAIN_SIZE - 1)];
            depth += 1;
        }

        (best.1 >= MIN_MATCH).then_some(best)
    }

    /// Compress `input` into `out` (cleared first) as one LZ4 block.
    pub(crate) fn compress(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.clear();
        if input.len() <= MFLIMIT {
            write_last_literals(out, input);
            return;
        }
        self.prepare();

        let match_limit = input.len() - LAST_LITERALS;
        let mf_limit = input.len() - MFLIMIT;
        let mut anchor = 0;
        let mut pos = 0;

        while pos < mf_limit {
            let Some((mut offset, mut len)) = self.find_match(input, pos, match_limit) else {
                pos += 1;
                continue;
            };
            while pos + 1 < mf_limit {
                match self.find_match(input, pos + 1, match_limit) {
                    Some((next_offset, next_len)) if next_len > len => {
                        pos += 1;
                        offset = next_offset;
                        len = next_len;
                    }
                    _ => break,
                }
            }

            write_sequence(out, &input[anchor..pos], offset, len);
            pos += len;
            anchor = pos;
        }

        write_last_literals(out, &input[anchor..]);
    }
}
