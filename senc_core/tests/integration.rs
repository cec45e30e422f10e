/// Integration tests: packet streams written by `Writer` and read back by
/// `Reader` over the bundled LZ4 transform.
///
/// Every test works on in-memory streams. Data is generated with a fixed
/// LCG so failures reproduce.
use std::io::{self, Cursor, ErrorKind, Read, Write};

use senc_codecs::Lz4Transform;
use senc_core::format::{read_packet, write_packet, DEFAULT_MAX_FRAME_LEN};
use senc_core::{
    CompressionMode, EntropyPolicy, EntropyTag, Error, Packet, PacketCodec, Reader, Writer,
    WriterConfig,
};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Generate `len` highly compressible bytes (repeating pattern).
fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

/// Text-like bytes with a skewed alphabet and irregular repeats.
fn mixed_bytes(len: usize, seed: u64) -> Vec<u8> {
    const WORDS: &[&[u8]] = &[b"packet ", b"stream ", b"literal ", b"command ", b"entropy ", b"\n"];
    let mut rng = seed;
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        out.extend_from_slice(WORDS[(rng >> 60) as usize % WORDS.len()]);
    }
    out.truncate(len);
    out
}

/// Uniform lowercase letters: few LZ matches, but only 26 byte values.
fn letter_bytes(len: usize, seed: u64) -> Vec<u8> {
    pseudo_random_bytes(len, seed)
        .into_iter()
        .map(|b| b'a' + b % 26)
        .collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

fn encode_stream(chunks: &[&[u8]], config: WriterConfig) -> Vec<u8> {
    let mut w = Writer::with_config(Vec::new(), Box::new(Lz4Transform::new()), config);
    for chunk in chunks {
        assert_eq!(w.write_packet(chunk).unwrap(), chunk.len());
    }
    w.into_inner().unwrap()
}

fn best_effort() -> WriterConfig {
    WriterConfig {
        mode: CompressionMode::BestEffort,
        ..WriterConfig::default()
    }
}

fn reader(wire: Vec<u8>) -> Reader<Cursor<Vec<u8>>> {
    Reader::new(Cursor::new(wire), Box::new(Lz4Transform::new()))
}

/// Drain `r` using reads of at most `buf_size` bytes.
fn read_all_with<R: Read>(r: &mut R, buf_size: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; buf_size];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

fn packets(wire: &[u8]) -> Vec<Packet> {
    let mut src = Cursor::new(wire);
    let mut all = Vec::new();
    loop {
        let mut p = Packet::default();
        match read_packet(&mut src, &mut p, DEFAULT_MAX_FRAME_LEN) {
            Ok(()) => all.push(p),
            Err(e) if e.is_end_of_stream() => return all,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

fn rewrite(packets: &[Packet]) -> Vec<u8> {
    let mut wire = Vec::new();
    for p in packets {
        write_packet(&mut wire, p).unwrap();
    }
    wire
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_sizes_three_bytes_at_a_time() {
    for len in [0, 1, 4096, 1_000_000] {
        let data = mixed_bytes(len, len as u64);
        for config in [WriterConfig::default(), best_effort()] {
            let wire = encode_stream(&[&data], config);
            let got = read_all_with(&mut reader(wire), 3).unwrap();
            assert_eq!(got.len(), data.len(), "len {len}, {config:?}");
            assert!(got == data, "payload mismatch for len {len}, {config:?}");
        }
    }
}

#[test]
fn test_many_packets_concatenate() {
    let chunks: Vec<Vec<u8>> = [17, 0, 65_536, 3, 100_000, 1]
        .iter()
        .enumerate()
        .map(|(i, &len)| mixed_bytes(len, i as u64))
        .collect();
    let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
    let expected = chunks.concat();

    let wire = encode_stream(&refs, WriterConfig::default());
    assert_eq!(packets(&wire).len(), chunks.len());
    for buf_size in [1, 7, 4096, 1 << 20] {
        let mut r = reader(wire.clone());
        assert!(read_all_with(&mut r, buf_size).unwrap() == expected, "buf {buf_size}");
        assert_eq!(r.packets_read(), chunks.len() as u64);
    }
}

#[test]
fn test_best_effort_decodes_identically() {
    let data = mixed_bytes(300_000, 99);
    let fast = encode_stream(&[&data], WriterConfig::default());
    let best = encode_stream(&[&data], best_effort());
    assert_ne!(fast, best);
    assert!(read_all_with(&mut reader(fast), 4096).unwrap() == data);
    assert!(read_all_with(&mut reader(best), 4096).unwrap() == data);
}

#[test]
fn test_compressible_packet_uses_fse_commands() {
    let data = mixed_bytes(64 * 1024, 5);
    let wire = encode_stream(&[&data], WriterConfig::default());
    let p = &packets(&wire)[0];
    assert_eq!(p.original_length, data.len() as u64);
    assert_eq!(p.command_tag, EntropyTag::Fse.as_u8());
    assert!(wire.len() < data.len());
}

#[test]
fn test_literal_heavy_packet_uses_fse_literals() {
    let data = letter_bytes(64 * 1024, 11);
    let wire = encode_stream(&[&data], WriterConfig::default());
    let p = &packets(&wire)[0];
    assert_eq!(p.literal_tag, EntropyTag::Fse.as_u8());
    assert!(p.literal_data.len() < data.len() * 3 / 4);
    assert!(read_all_with(&mut reader(wire), 4096).unwrap() == data);
}

#[test]
fn test_incompressible_literals_stored_raw() {
    let data = pseudo_random_bytes(64 * 1024, 42);
    let wire = encode_stream(&[&data], WriterConfig::default());
    let p = &packets(&wire)[0];
    assert_eq!(p.literal_tag, EntropyTag::Raw.as_u8());
    assert!(read_all_with(&mut reader(wire), 1000).unwrap() == data);
}

#[test]
fn test_compressible_roundtrip_shrinks() {
    let data = compressible_bytes(1 << 20);
    for config in [WriterConfig::default(), best_effort()] {
        let wire = encode_stream(&[&data], config);
        assert!(wire.len() < data.len() / 100, "{config:?}: {} bytes", wire.len());
        assert!(read_all_with(&mut reader(wire), 65_536).unwrap() == data);
    }
}

#[test]
fn test_smallest_policy_readable_by_default_reader() {
    let data = mixed_bytes(200_000, 3);
    let config = WriterConfig {
        entropy: EntropyPolicy::Smallest,
        ..best_effort()
    };
    let smallest = encode_stream(&[&data, &data[..1000]], config);
    let fse_only = encode_stream(&[&data, &data[..1000]], best_effort());
    assert!(smallest.len() <= fse_only.len());

    let mut expected = data.clone();
    expected.extend_from_slice(&data[..1000]);
    assert!(read_all_with(&mut reader(smallest), 333).unwrap() == expected);
}

#[test]
fn test_unknown_tag_is_invalid_data() {
    let data = mixed_bytes(10_000, 8);
    let mut ps = packets(&encode_stream(&[&data], WriterConfig::default()));
    ps[0].literal_tag = 0x7f;
    let mut r = reader(rewrite(&ps));
    let err = read_all_with(&mut r, 512).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(matches!(r.error(), Some(Error::UnknownEntropyTag(0x7f))));
}

#[test]
fn test_error_is_sticky_after_good_packets() {
    let good = mixed_bytes(5000, 1);
    let mut ps = packets(&encode_stream(&[&good, &good], WriterConfig::default()));
    ps[1].command_tag = 9;
    let mut r = reader(rewrite(&ps));

    let mut buf = vec![0u8; 8000];
    // The first payload is delivered before the failure surfaces.
    assert_eq!(r.read(&mut buf).unwrap(), 5000);
    assert!(buf[..5000] == good[..]);
    for _ in 0..4 {
        assert_eq!(r.read(&mut buf).unwrap_err().kind(), ErrorKind::InvalidData);
    }
    assert_eq!(r.packets_read(), 1);
}

#[test]
fn test_truncated_stream_fails() {
    let data = mixed_bytes(20_000, 11);
    let mut wire = encode_stream(&[&data, &data], WriterConfig::default());
    wire.truncate(wire.len() - 10);
    let mut r = reader(wire);
    let err = read_all_with(&mut r, 4096).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(matches!(r.error(), Some(Error::FrameDecode(_))));
    assert_eq!(r.read(&mut [0u8; 16]).unwrap_err().kind(), ErrorKind::InvalidData);
}

#[test]
fn test_wrong_original_length_fails() {
    let data = compressible_bytes(4096);
    let mut ps = packets(&encode_stream(&[&data], WriterConfig::default()));
    ps[0].original_length += 1;
    let mut r = reader(rewrite(&ps));
    assert!(read_all_with(&mut r, 4096).is_err());
    assert!(matches!(r.error(), Some(Error::BlockTransform { .. })));
}

#[test]
fn test_hostile_lengths_fail_without_allocating() {
    // A one-symbol table claiming 12 MiB, inside a tiny frame that claims
    // 200 times that as the payload.
    let mut command_data = vec![5, 0, 32, 0, 0];
    command_data.extend_from_slice(&(12u32 << 20).to_le_bytes());
    let hostile = Packet {
        command_tag: EntropyTag::Fse.as_u8(),
        command_data,
        original_length: (12 << 20) * 200,
        ..Packet::default()
    };
    let mut wire = Vec::new();
    write_packet(&mut wire, &hostile).unwrap();
    assert!(wire.len() < 32);

    let mut r = reader(wire);
    let err = read_all_with(&mut r, 4096).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(matches!(r.error(), Some(Error::PayloadTooLarge { .. })));

    // Within the payload limit, the table itself is refused.
    let mut codec = PacketCodec::new(Box::new(Lz4Transform::new()));
    let within = Packet {
        original_length: 12 << 20,
        ..hostile.clone()
    };
    assert!(matches!(codec.decode(&within), Err(Error::EntropyDecode(_))));

    // A valid but skewed table may not claim more than a block of the
    // payload's size can hold.
    let mut command_data = vec![5, 1, 31, 1, 0, 0];
    command_data.extend_from_slice(&(12u32 << 20).to_le_bytes());
    let skewed = Packet {
        command_data,
        original_length: 1 << 20,
        ..hostile
    };
    assert!(matches!(codec.decode(&skewed), Err(Error::EntropyDecode(_))));
    assert!(codec.last_output().is_empty());
}

#[test]
fn test_clean_end_is_sticky() {
    let mut r = reader(encode_stream(&[b"tail"], WriterConfig::default()));
    let mut buf = [0u8; 64];
    assert_eq!(r.read(&mut buf).unwrap(), 4);
    for _ in 0..3 {
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }
    assert!(r.error().is_some_and(Error::is_end_of_stream));
}

#[test]
fn test_empty_stream_reads_nothing() {
    let mut r = reader(Vec::new());
    assert!(read_all_with(&mut r, 16).unwrap().is_empty());
    assert_eq!(r.packets_read(), 0);
}

#[test]
fn test_output_buffer_grows_and_shrinks_between_packets() {
    let small = mixed_bytes(10, 1);
    let large = mixed_bytes(500_000, 2);
    let wire = encode_stream(&[&small, &large, &small], WriterConfig::default());
    let mut expected = small.clone();
    expected.extend_from_slice(&large);
    expected.extend_from_slice(&small);
    assert!(read_all_with(&mut reader(wire), 100_000).unwrap() == expected);
}

#[test]
fn test_writer_reset_starts_independent_stream() {
    let a = mixed_bytes(30_000, 21);
    let b = mixed_bytes(30_000, 22);
    let mut w = Writer::new(Vec::new(), Box::new(Lz4Transform::new()));
    w.write_packet(&a).unwrap();
    let first = w.reset(Vec::new());
    w.write_packet(&b).unwrap();
    let second = w.into_inner().unwrap();

    assert_eq!(second, encode_stream(&[&b], WriterConfig::default()));

    let mut r = reader(first);
    assert!(read_all_with(&mut r, 4096).unwrap() == a);
    r.reset(Cursor::new(second));
    assert!(read_all_with(&mut r, 4096).unwrap() == b);
}

#[test]
fn test_reader_reset_after_failure() {
    let mut r = reader(vec![0xff; 32]);
    assert!(read_all_with(&mut r, 64).is_err());
    r.reset(Cursor::new(encode_stream(&[b"recovered"], WriterConfig::default())));
    assert_eq!(read_all_with(&mut r, 64).unwrap(), b"recovered");
}

#[test]
fn test_io_traits_compose() {
    let data = mixed_bytes(150_000, 77);
    let mut w = Writer::new(Vec::new(), Box::new(Lz4Transform::new()));
    for chunk in data.chunks(40_000) {
        w.write_all(chunk).unwrap();
    }
    w.flush().unwrap();
    assert_eq!(w.packets_written(), 4);

    let mut r = reader(w.into_inner().unwrap());
    let mut out = Vec::new();
    io::copy(&mut r, &mut out).unwrap();
    assert!(out == data);
}

#[test]
fn test_codec_directly() {
    let data = mixed_bytes(12_345, 4);
    let mut codec = PacketCodec::new(Box::new(Lz4Transform::new()));
    let mut p = Packet::default();
    codec.encode(&data, CompressionMode::BestEffort, &mut p).unwrap();
    assert_eq!(codec.transform_name(), "lz4");
    assert!(codec.decode(&p).unwrap() == data.as_slice());
    assert!(codec.last_output() == data.as_slice());
}
