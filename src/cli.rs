//! Command-line surface, matching the flag table in `SPEC_FULL.md` §6
//! (itself carried forward unchanged from the distilled spec) and
//! grounded on `original_source/main.c`'s `getopt` loop. Built with
//! `clap`'s derive API the way the retrieval pack's other deterministic
//! simulation CLIs do (see `DESIGN.md`), rather than hand-rolling flag
//! parsing the way the C original does with `getopt`.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// A workbench for studying heap allocator fragmentation under synthetic
/// and trace-driven workloads.
#[derive(Parser, Debug)]
#[command(name = "fragbench", version, about)]
pub struct Cli {
    /// Minimum size of a synthetically generated allocation.
    #[arg(short = 'm', long = "minimal-size", value_parser = parse_minimal_size, default_value = "128")]
    pub minimal_size: usize,

    /// Width of the uniform range added on top of `minimal_size`.
    #[arg(short = 'r', long = "size-range", value_parser = parse_size_range, default_value = "65536")]
    pub size_range: usize,

    /// Allocator backend to drive.
    #[arg(short = 't', long = "type", value_enum, default_value = "dl")]
    pub backend: Backend,

    /// Wrap the selected backend with the chunky splitter.
    #[arg(short = 'c', long = "chunky")]
    pub chunky: bool,

    /// Disable the periodic bump phase.
    #[arg(short = 'b', long = "no-bump")]
    pub no_bump: bool,

    /// Seed the PRNG from OS entropy instead of the fixed seed 0.
    #[arg(short = 'n', long = "randomize")]
    pub randomize: bool,

    /// Replay a recorded trace from this path instead of running the
    /// random steady-state workload, then exit.
    #[arg(short = 'd', long = "trace-path", value_name = "PATH")]
    pub trace_path: Option<PathBuf>,

    /// Write a chunk map to this path at the first bump phase.
    #[arg(short = 'p', long = "chunk-map-path", value_name = "PATH")]
    pub dump_path: Option<PathBuf>,

    /// Print resident set size (`/proc/self/statm`) alongside each stats
    /// report. Best-effort and Linux-only; not load-bearing for any waste
    /// calculation (see `SPEC_FULL.md` §1's ambient-stack note on RSS).
    #[arg(long = "rss")]
    pub rss: bool,
}

/// Backend selector for `-t`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `dlmalloc`, reached through a thin adapter.
    Dl,
    /// The boundary-tag best-fit allocator (§4.3).
    Mini,
    /// `jemalloc`, reached through `tikv-jemallocator` (unix only).
    Je,
    /// The power-of-two buddy allocator (§4.2), itself always chunked.
    Buddy,
}

fn parse_minimal_size(s: &str) -> Result<usize, String> {
    parse_ranged(s, 128, 2_000_000, "minimal_size")
}

fn parse_size_range(s: &str) -> Result<usize, String> {
    parse_ranged(s, 1, 20_000_000, "size_range")
}

fn parse_ranged(s: &str, min: usize, max: usize, name: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("invalid {name}: {s:?}"))?;
    if n < min || n > max {
        return Err(format!("{name} out of range [{min}, {max}]: {n}"));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_minimal_size_below_range() {
        assert!(parse_minimal_size("127").is_err());
        assert!(parse_minimal_size("128").is_ok());
    }

    #[test]
    fn rejects_size_range_above_range() {
        assert!(parse_size_range("20000001").is_err());
        assert!(parse_size_range("20000000").is_ok());
    }

    #[test]
    fn parses_backend_variants_from_cli_tokens() {
        let cli = Cli::parse_from(["fragbench", "-t", "mini", "-c", "-b"]);
        assert_eq!(cli.backend, Backend::Mini);
        assert!(cli.chunky);
        assert!(cli.no_bump);
    }
}
