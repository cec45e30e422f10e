use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use senc_codecs::Lz4Transform;
use senc_core::format::{
    frame_len, read_packet, Packet, DEFAULT_MAX_FRAME_LEN, DEFAULT_MAX_PAYLOAD_LEN,
};
use senc_core::{
    CompressionMode, EntropyPolicy, EntropyTag, Reader, ReaderConfig, Writer, WriterConfig,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "senc",
    about = "Split-stream entropy-coded packets: compress, decompress, and inspect packet streams",
    version
)]
struct Cli {
    /// Log at debug level (overrides SENC_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// FSE, falling back to raw
    Fse,
    /// Try FSE and Huffman, keep the smaller
    Smallest,
}

impl From<Policy> for EntropyPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Fse => EntropyPolicy::FseOnly,
            Policy::Smallest => EntropyPolicy::Smallest,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a packet stream, one packet per chunk
    Compress {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination packet stream
        output: PathBuf,
        /// Use the slower, higher-ratio block compressor
        #[arg(long)]
        best_effort: bool,
        /// Hash-chain depth level for --best-effort (1–9)
        #[arg(long, default_value_t = 9)]
        hc_level: u8,
        /// Raw bytes per packet
        #[arg(short, long, default_value_t = 64 * 1024)]
        chunk_size: usize,
        /// Substream entropy policy
        #[arg(short, long, value_enum, default_value_t = Policy::Fse)]
        policy: Policy,
    },
    /// Decompress a packet stream back to raw bytes
    Decompress {
        /// Source packet stream
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        /// Bytes requested from the reader per call
        #[arg(long, default_value_t = 64 * 1024)]
        read_size: usize,
        /// Largest frame accepted, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
        max_frame_len: u64,
        /// Largest decoded packet accepted, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_LEN)]
        max_payload_len: u64,
    },
    /// Print per-stream statistics
    Inspect {
        /// Packet stream to inspect
        file: PathBuf,
        /// Print per-packet details
        #[arg(long)]
        packets: bool,
        /// Largest frame accepted, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
        max_frame_len: u64,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SENC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn ratio(raw: u64, compressed: u64) -> f64 {
    if compressed == 0 {
        0.0
    } else {
        raw as f64 / compressed as f64
    }
}

fn is_std(path: &Path) -> bool {
    path.to_str() == Some("-")
}

fn tag_name(tag: u8) -> &'static str {
    EntropyTag::try_from(tag).map(EntropyTag::name).unwrap_or("?")
}

/// Fill `buf` from `src` until it is full or the source ends.
fn read_chunk(src: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    best_effort: bool,
    hc_level: u8,
    chunk_size: usize,
    policy: Policy,
) -> anyhow::Result<()> {
    anyhow::ensure!(chunk_size > 0, "--chunk-size must be positive");
    anyhow::ensure!(
        chunk_size as u64 <= DEFAULT_MAX_PAYLOAD_LEN,
        "--chunk-size must not exceed {} so default readers accept every packet",
        human_bytes(DEFAULT_MAX_PAYLOAD_LEN)
    );

    let mut src: Box<dyn Read> = if is_std(&input) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(&input).with_context(|| format!("opening input file {:?}", input))?,
        ))
    };
    let dst = File::create(&output).with_context(|| format!("creating output file {:?}", output))?;

    let config = WriterConfig {
        mode: if best_effort {
            CompressionMode::BestEffort
        } else {
            CompressionMode::Fast
        },
        entropy: policy.into(),
    };
    let transform = Lz4Transform::with_hc_level(hc_level);
    let level = transform.hc_level();
    let mut writer = Writer::with_config(BufWriter::new(dst), Box::new(transform), config);
    debug!(?config, chunk_size, "compressing");

    let t0 = Instant::now();
    let mut buf = vec![0u8; chunk_size];
    let mut bytes_read = 0u64;
    loop {
        let n = read_chunk(&mut src, &mut buf).context("reading input")?;
        if n == 0 {
            break;
        }
        writer
            .write_packet(&buf[..n])
            .with_context(|| format!("encoding packet {}", writer.packets_written()))?;
        bytes_read += n as u64;
    }
    let packets = writer.packets_written();
    writer.into_inner()?.flush()?;
    let elapsed = t0.elapsed();

    let compressed_size = std::fs::metadata(&output)?.len();
    info!(packets, raw = bytes_read, compressed = compressed_size, "compressed");

    eprintln!("  transform   : lz4{}", if best_effort { format!(" (hc level {})", level) } else { String::new() });
    eprintln!("  policy      : {:?}", config.entropy);
    eprintln!("  chunk size  : {}", human_bytes(chunk_size as u64));
    eprintln!("  packets     : {}", packets);
    eprintln!("  raw size    : {}", human_bytes(bytes_read));
    eprintln!("  compressed  : {}", human_bytes(compressed_size));
    eprintln!("  ratio       : {:.2}x", ratio(bytes_read, compressed_size));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((bytes_read as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(
    input: PathBuf,
    output: PathBuf,
    read_size: usize,
    config: ReaderConfig,
) -> anyhow::Result<()> {
    anyhow::ensure!(read_size > 0, "--read-size must be positive");

    let src = File::open(&input).with_context(|| format!("opening input file {:?}", input))?;
    let mut reader = Reader::with_config(src, Box::new(Lz4Transform::new()), config);

    let mut dst: Box<dyn Write> = if is_std(&output) {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(
            File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
        ))
    };

    let t0 = Instant::now();
    let mut buf = vec![0u8; read_size];
    let mut total_raw = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("decoding packet {}", reader.packets_read()))?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
        total_raw += n as u64;
    }
    dst.flush()?;

    let elapsed = t0.elapsed();
    info!(packets = reader.packets_read(), raw = total_raw, "decompressed");
    eprintln!("  packets     : {}", reader.packets_read());
    eprintln!("  raw size    : {}", human_bytes(total_raw));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((total_raw as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_packets: bool, max_frame_len: u64) -> anyhow::Result<()> {
    let file_size = std::fs::metadata(&file)
        .with_context(|| format!("reading metadata of {:?}", file))?
        .len();
    let mut src = BufReader::new(File::open(&file)?);

    println!("=== senc stream: {:?} ===", file);
    if show_packets {
        println!();
        println!(
            "  {:>8}  {:>12}  {:>8}  {:>12}  {:>8}  {:>12}  {:>12}",
            "packet", "raw", "cmd tag", "commands", "lit tag", "literals", "frame"
        );
        println!("  {}", "-".repeat(84));
    }

    let mut packet = Packet::default();
    let mut count = 0u64;
    let mut raw_total = 0u64;
    let mut command_total = 0u64;
    let mut literal_total = 0u64;
    let mut tag_counts = [0u64; 3];
    loop {
        match read_packet(&mut src, &mut packet, max_frame_len) {
            Ok(()) => {}
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => return Err(e).with_context(|| format!("reading packet {}", count)),
        }
        for tag in [packet.command_tag, packet.literal_tag] {
            if let Some(slot) = tag_counts.get_mut(tag as usize) {
                *slot += 1;
            }
        }
        if show_packets {
            println!(
                "  {:>8}  {:>12}  {:>8}  {:>12}  {:>8}  {:>12}  {:>12}",
                count,
                human_bytes(packet.original_length),
                tag_name(packet.command_tag),
                human_bytes(packet.command_data.len() as u64),
                tag_name(packet.literal_tag),
                human_bytes(packet.literal_data.len() as u64),
                human_bytes(frame_len(&packet)?),
            );
        }
        count += 1;
        raw_total += packet.original_length;
        command_total += packet.command_data.len() as u64;
        literal_total += packet.literal_data.len() as u64;
    }

    println!();
    println!("  packets        : {}", count);
    println!("  raw size       : {}", human_bytes(raw_total));
    println!("  command bytes  : {}", human_bytes(command_total));
    println!("  literal bytes  : {}", human_bytes(literal_total));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.2}x", ratio(raw_total, file_size));
    println!(
        "  substream tags : raw={} fse={} huffman={}",
        tag_counts[0], tag_counts[1], tag_counts[2]
    );
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Compress {
            input,
            output,
            best_effort,
            hc_level,
            chunk_size,
            policy,
        } => run_compress(input, output, best_effort, hc_level, chunk_size, policy),
        Commands::Decompress {
            input,
            output,
            read_size,
            max_frame_len,
            max_payload_len,
        } => run_decompress(
            input,
            output,
            read_size,
            ReaderConfig {
                max_frame_len,
                max_payload_len,
            },
        ),
        Commands::Inspect {
            file,
            packets,
            max_frame_len,
        } => run_inspect(file, packets, max_frame_len),
    }
}
