//! rebuf: repeatable access over single-pass byte streams.
//!
//! Usage: rebuf <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::error::Error;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use rebuf::config::{parse_byte_size, BufferConfig, OffHeapMode};
use rebuf::provider::{CursorProviderFactory, CursorStreamProvider, ProviderStrategy};

#[derive(Parser)]
#[command(name = "rebuf")]
#[command(version)]
#[command(about = "Repeatable buffered byte streams: extract arbitrary ranges from single-pass input", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one or more byte ranges from a file or stdin
    Slice {
        /// Input file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Byte range START..END (size suffixes allowed, e.g. 0..256K).
        /// May be given multiple times; ranges are extracted in parallel,
        /// each through its own cursor, and written in request order.
        #[arg(short, long = "range", required = true)]
        ranges: Vec<String>,

        /// In-memory window capacity (e.g. 64K, 2M)
        #[arg(short, long, default_value = "256K")]
        buffer_size: String,

        /// Disable disk spill: data behind the window reads as missing
        #[arg(long)]
        no_spill: bool,

        /// Refuse inputs larger than the buffer size instead of spilling
        #[arg(long)]
        in_memory_only: bool,
    },

    /// Report the buffering strategy and total length for an input
    Probe {
        /// Input file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// In-memory window capacity (e.g. 64K, 2M)
        #[arg(short, long, default_value = "256K")]
        buffer_size: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Slice {
            input,
            ranges,
            buffer_size,
            no_spill,
            in_memory_only,
        } => run_slice(input, ranges, buffer_size, no_spill, in_memory_only),

        Commands::Probe { input, buffer_size } => run_probe(input, buffer_size),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn open_input(input: Option<PathBuf>) -> Result<Box<dyn Read + Send>, Box<dyn Error>> {
    match input {
        Some(path) if path.as_os_str() != "-" => Ok(Box::new(File::open(path)?)),
        _ => Ok(Box::new(io::stdin())),
    }
}

fn build_provider(
    input: Option<PathBuf>,
    buffer_size: &str,
    no_spill: bool,
    in_memory_only: bool,
) -> Result<CursorStreamProvider, Box<dyn Error>> {
    let buffer_size = parse_byte_size(buffer_size)?;
    let source = open_input(input)?;

    let factory = if in_memory_only {
        CursorProviderFactory::in_memory_only(buffer_size)
    } else {
        let off_heap = if no_spill {
            OffHeapMode::Disabled
        } else {
            OffHeapMode::FileStore
        };
        CursorProviderFactory::new(
            BufferConfig::new()
                .with_buffer_size(buffer_size)
                .with_off_heap(off_heap),
        )
    };

    Ok(factory.create(source)?)
}

/// Parse `START..END` where both bounds take byte-size suffixes.
fn parse_range(s: &str) -> Result<(u64, u64), String> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| format!("invalid range (expected START..END): {s}"))?;

    let start = parse_byte_size(start)? as u64;
    let end = parse_byte_size(end)? as u64;

    if end < start {
        return Err(format!("range end precedes start: {s}"));
    }
    Ok((start, end))
}

fn run_slice(
    input: Option<PathBuf>,
    ranges: Vec<String>,
    buffer_size: String,
    no_spill: bool,
    in_memory_only: bool,
) -> Result<(), Box<dyn Error>> {
    let ranges: Vec<(u64, u64)> = ranges
        .iter()
        .map(|s| parse_range(s))
        .collect::<Result<_, _>>()?;

    let provider = build_provider(input, &buffer_size, no_spill, in_memory_only)?;

    // One cursor per range; cursors share the underlying buffer and are
    // safe to drive from worker threads.
    let slices: Vec<Vec<u8>> = ranges
        .par_iter()
        .map(|&(start, end)| -> Result<Vec<u8>, rebuf::StreamError> {
            let mut cursor = provider.open_cursor()?;
            cursor.seek_to(start)?;
            let mut out = Vec::with_capacity((end - start) as usize);
            let mut remaining = (&mut cursor).take(end - start);
            remaining.read_to_end(&mut out)?;
            Ok(out)
        })
        .collect::<Result<_, _>>()?;

    provider.close();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for slice in slices {
        out.write_all(&slice)?;
    }
    out.flush()?;
    Ok(())
}

fn run_probe(input: Option<PathBuf>, buffer_size: String) -> Result<(), Box<dyn Error>> {
    let provider = build_provider(input, &buffer_size, false, false)?;

    let mut cursor = provider.open_cursor()?;
    let total = io::copy(&mut cursor, &mut io::sink())?;
    drop(cursor);

    let strategy = match provider.strategy() {
        ProviderStrategy::InMemory => "in-memory",
        ProviderStrategy::Buffered => "buffered (disk spill)",
    };
    println!("strategy: {strategy}");
    println!("length: {total} bytes");
    println!("window: {} bytes", parse_byte_size(&buffer_size)?);

    provider.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0..100"), Ok((0, 100)));
        assert_eq!(parse_range("1K..2K"), Ok((1024, 2048)));
        assert!(parse_range("100..0").is_err());
        assert!(parse_range("100").is_err());
        assert!(parse_range("a..b").is_err());
    }
}
