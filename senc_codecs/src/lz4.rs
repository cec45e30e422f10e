use senc_core::codec::BlockTransform;
use senc_core::error::{Error, Result};
use tracing::trace;

use crate::hc::{HcCompressor, MAX_LEVEL};

const NAME: &str = "lz4";
/// Floor for the decompressed-size bound of tiny blocks.
const MIN_BLOCK_SPAN: usize = 64;

fn malformed(message: &str) -> Error {
    Error::block(NAME, message)
}

/// LZ4 block transform.
///
/// Fast mode uses `lz4_flex`; best-effort mode runs a hash-chain match
/// finder over the same block format, so one decoder serves both.
///
/// A block is split per sequence: the token, length extension bytes and
/// match offset go to the command stream, literal bytes to the literal
/// stream. The final sequence carries literals only.
#[derive(Debug, Clone)]
pub struct Lz4Transform {
    hc: HcCompressor,
}

impl Default for Lz4Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Lz4Transform {
    pub fn new() -> Self {
        Self::with_hc_level(MAX_LEVEL)
    }

    /// Chain depth of the best-effort compressor, clamped to `1..=9`.
    pub fn with_hc_level(level: u8) -> Self {
        Self {
            hc: HcCompressor::new(level),
        }
    }

    pub fn hc_level(&self) -> u8 {
        self.hc.level()
    }
}

/// Moves a length field (nibble plus 255-run extension) from `src` to `dst`.
fn copy_length(nibble: u8, src: &[u8], pos: &mut usize, dst: &mut Vec<u8>) -> Result<usize> {
    let mut len = nibble as usize;
    if nibble == 15 {
        loop {
            let b = *src
                .get(*pos)
                .ok_or_else(|| malformed("truncated length"))?;
            dst.push(b);
            *pos += 1;
            len += b as usize;
            if b != 255 {
                break;
            }
        }
    }
    Ok(len)
}

impl BlockTransform for Lz4Transform {
    fn name(&self) -> &'static str {
        NAME
    }

    fn compress(&mut self, data: &[u8], block: &mut Vec<u8>) -> Result<()> {
        block.clear();
        block.resize(lz4_flex::block::get_maximum_output_size(data.len()), 0);
        let n = lz4_flex::block::compress_into(data, block)
            .map_err(|e| Error::block(NAME, e.to_string()))?;
        block.truncate(n);
        Ok(())
    }

    fn compress_best_effort(&mut self, data: &[u8], block: &mut Vec<u8>) -> Result<()> {
        self.hc.compress(data, block);
        trace!(
            level = self.hc.level(),
            raw = data.len(),
            block = block.len(),
            "hc block"
        );
        Ok(())
    }

    fn split(&self, block: &[u8], commands: &mut Vec<u8>, literals: &mut Vec<u8>) -> Result<()> {
        commands.clear();
        literals.clear();
        let mut pos = 0usize;
        while pos < block.len() {
            let token = block[pos];
            commands.push(token);
            pos += 1;

            let lit = copy_length(token >> 4, block, &mut pos, commands)?;
            let end = pos
                .checked_add(lit)
                .filter(|&end| end <= block.len())
                .ok_or_else(|| malformed("literal run past end of block"))?;
            literals.extend_from_slice(&block[pos..end]);
            pos = end;
            if pos == block.len() {
                break;
            }

            let offset = block
                .get(pos..pos + 2)
                .ok_or_else(|| malformed("truncated match offset"))?;
            commands.extend_from_slice(offset);
            pos += 2;
            copy_length(token & 0x0f, block, &mut pos, commands)?;
        }
        Ok(())
    }

    fn merge(&self, commands: &[u8], literals: &[u8], block: &mut Vec<u8>) -> Result<()> {
        block.clear();
        let mut pos = 0usize;
        let mut lit_pos = 0usize;
        while pos < commands.len() {
            let token = commands[pos];
            block.push(token);
            pos += 1;

            let lit = copy_length(token >> 4, commands, &mut pos, block)?;
            let run = lit_pos
                .checked_add(lit)
                .and_then(|end| literals.get(lit_pos..end))
                .ok_or_else(|| malformed("literal stream too short"))?;
            block.extend_from_slice(run);
            lit_pos += lit;
            if pos == commands.len() {
                break;
            }

            let offset = commands
                .get(pos..pos + 2)
                .ok_or_else(|| malformed("truncated match offset"))?;
            block.extend_from_slice(offset);
            pos += 2;
            copy_length(token & 0x0f, commands, &mut pos, block)?;
        }
        if lit_pos != literals.len() {
            return Err(malformed("literal stream not fully consumed"));
        }
        Ok(())
    }

    fn max_decompressed_len(&self, block_len: usize) -> usize {
        // A single length extension byte expands to at most 255 output bytes.
        block_len.saturating_mul(255).max(MIN_BLOCK_SPAN)
    }

    fn max_block_len(&self, payload_len: usize) -> usize {
        // The HC encoder's literal-only worst case is below this bound too.
        lz4_flex::block::get_maximum_output_size(payload_len)
    }

    fn decompress(&self, block: &[u8], out: &mut [u8]) -> Result<()> {
        if out.is_empty() && matches!(block, [] | [0]) {
            return Ok(());
        }
        let n = lz4_flex::block::decompress_into(block, out)
            .map_err(|e| Error::block(NAME, e.to_string()))?;
        if n != out.len() {
            return Err(Error::block(
                NAME,
                format!("decoded {} bytes, expected {}", n, out.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(len: usize) -> Vec<u8> {
        b"sequences carry literals then a match; "
            .iter()
            .cycle()
            .take(len)
            .copied()
            .collect()
    }

    fn blocks(input: &[u8]) -> [Vec<u8>; 2] {
        let mut t = Lz4Transform::new();
        let (mut fast, mut best) = (Vec::new(), Vec::new());
        t.compress(input, &mut fast).unwrap();
        t.compress_best_effort(input, &mut best).unwrap();
        [fast, best]
    }

    #[test]
    fn test_both_modes_decompress() {
        let t = Lz4Transform::new();
        for len in [0, 1, 12, 13, 100, 70_000] {
            let input = text(len);
            for block in blocks(&input) {
                let mut out = vec![0u8; len];
                t.decompress(&block, &mut out).unwrap();
                assert_eq!(out, input);
            }
        }
    }

    #[test]
    fn test_split_then_merge_is_identity() {
        let t = Lz4Transform::new();
        let mut input = text(5000);
        input.extend(0u8..=255);
        input.extend(std::iter::repeat(3u8).take(700));
        for block in blocks(&input) {
            let (mut commands, mut literals, mut merged) = (Vec::new(), Vec::new(), Vec::new());
            t.split(&block, &mut commands, &mut literals).unwrap();
            assert_eq!(commands.len() + literals.len(), block.len());
            t.merge(&commands, &literals, &mut merged).unwrap();
            assert_eq!(merged, block);
        }
    }

    #[test]
    fn test_split_separates_literals() {
        // 20 literals (nibble 15 + ext 5), offset 20, match 4 + 15 + 1; then 5 literals.
        let mut block = vec![0xff, 5];
        block.extend(b"abcdefghijklmnopqrst");
        block.extend([20, 0, 1, 0x50]);
        block.extend(b"uvwxy");
        let t = Lz4Transform::new();
        let (mut commands, mut literals) = (Vec::new(), Vec::new());
        t.split(&block, &mut commands, &mut literals).unwrap();
        assert_eq!(commands, vec![0xff, 5, 20, 0, 1, 0x50]);
        assert_eq!(literals, b"abcdefghijklmnopqrstuvwxy");
    }

    #[test]
    fn test_split_rejects_truncated_blocks() {
        let t = Lz4Transform::new();
        let (mut c, mut l) = (Vec::new(), Vec::new());
        for bad in [&[0xf0][..], &[0x30, b'a'], &[0x10, b'a', 1], &[0x1f, b'a', 1, 0]] {
            assert!(t.split(bad, &mut c, &mut l).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_merge_rejects_mismatched_literals() {
        let t = Lz4Transform::new();
        let [block, _] = blocks(&text(1000));
        let (mut commands, mut literals, mut merged) = (Vec::new(), Vec::new(), Vec::new());
        t.split(&block, &mut commands, &mut literals).unwrap();

        literals.push(b'!');
        assert!(t.merge(&commands, &literals, &mut merged).is_err());
        literals.truncate(literals.len() - 2);
        assert!(t.merge(&commands, &literals, &mut merged).is_err());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let t = Lz4Transform::new();
        let [block, _] = blocks(&text(500));
        let mut short = vec![0u8; 499];
        assert!(t.decompress(&block, &mut short).is_err());
        let mut long = vec![0u8; 501];
        assert!(t.decompress(&block, &mut long).is_err());
    }

    #[test]
    fn test_garbage_block_rejected() {
        let t = Lz4Transform::new();
        let mut out = vec![0u8; 64];
        assert!(t.decompress(&[0x0f, 0xff, 0xff], &mut out).is_err());
        assert!(t.decompress(&[], &mut out).is_err());
    }

    #[test]
    fn test_decompressed_bound_covers_real_blocks() {
        let t = Lz4Transform::new();
        let input = vec![0u8; 1 << 20];
        for block in blocks(&input) {
            assert!(t.max_decompressed_len(block.len()) >= input.len());
        }
        assert!(t.max_decompressed_len(1) < 1 << 20);
    }

    #[test]
    fn test_block_bound_covers_both_modes() {
        let t = Lz4Transform::new();
        let mut rng = 0x9e37_79b9_u64;
        let noise: Vec<u8> = (0..20_000)
            .map(|_| {
                rng = rng
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (rng >> 56) as u8
            })
            .collect();
        for input in [Vec::new(), noise[..13].to_vec(), noise, text(20_000)] {
            let bound = t.max_block_len(input.len());
            for block in blocks(&input) {
                assert!(block.len() <= bound, "{} > {}", block.len(), bound);
            }
        }
    }

    #[test]
    fn test_hc_level_is_clamped() {
        assert_eq!(Lz4Transform::with_hc_level(0).hc_level(), 1);
        assert_eq!(Lz4Transform::with_hc_level(42).hc_level(), 9);
        assert_eq!(Lz4Transform::default().hc_level(), 9);
    }
}
