#![deny(rust_2018_idioms)]

mod backend;
mod buddy;
mod chunky;
mod cli;
mod driver;
mod error;
mod freelist;
mod logging;
mod mini;
mod os;
mod size_class;
mod unit;

use backend::Allocator;
use clap::Parser;
use cli::{Backend, Cli};
use error::Error;
use std::process::ExitCode;

/// `k` for every chunky splitter this binary constructs — the one runtime
/// knob the C original hardcoded differently per translation unit (see
/// `DESIGN.md`'s `CHUNKS_COUNT` entry).
const CHUNKS_PER_SPLIT: usize = 4;
const MIN_ORDER: u32 = 5;
const MAX_ORDER: u32 = 25;
/// Arena grown per OS grant by the mini backend, matching `minimalloc.c`'s
/// `CHUNK_SIZE`.
const MINI_CHUNK_SIZE: usize = 4 * unit::MIB;
/// Conservative per-sub-allocation metadata allowance used when the CLI's
/// `-c` flag wraps an opaque (boxed) backend whose real per-chunk
/// overhead isn't known at this call site.
const GENERIC_CHUNK_OVERHEAD: usize = 16;

fn main() -> ExitCode {
    logging::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if e.kind() == clap::error::ErrorKind::DisplayHelp
                || e.kind() == clap::error::ErrorKind::DisplayVersion
            {
                print!("{e}");
                return ExitCode::SUCCESS;
            }
            eprint!("{e}");
            return ExitCode::from(1);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn build_backend(cli: &Cli) -> Result<Box<dyn Allocator>, Error> {
    let base: Box<dyn Allocator> = match cli.backend {
        Backend::Dl => Box::new(backend::dl_backend::DlBackend::new()),
        Backend::Mini => Box::new(backend::mini_backend::MiniBackend::new(MINI_CHUNK_SIZE)),
        #[cfg(unix)]
        Backend::Je => Box::new(backend::je_backend::JeBackend::new()),
        #[cfg(not(unix))]
        Backend::Je => return Err(Error::Cli("the je backend is unix-only".into())),
        Backend::Buddy => Box::new(backend::buddy_backend::BuddyBackend::new(
            MIN_ORDER,
            MAX_ORDER,
            CHUNKS_PER_SPLIT,
        )),
    };

    Ok(if cli.chunky {
        Box::new(chunky::Splitter::new(
            base,
            CHUNKS_PER_SPLIT,
            MIN_ORDER,
            MAX_ORDER,
            GENERIC_CHUNK_OVERHEAD,
        ))
    } else {
        base
    })
}

fn run(cli: Cli) -> Result<(), Error> {
    log::info!("name = {}", build_backend_name(&cli));
    log::info!("minimal_size = {}", cli.minimal_size);
    log::info!("size_range = {}", cli.size_range);

    let backend = build_backend(&cli)?;
    let live_target = driver::DEFAULT_LIVE_MIB * unit::MIB as u64;
    let config = driver::Config {
        minimal_size: cli.minimal_size,
        size_range: cli.size_range,
        bump_enabled: !cli.no_bump,
        randomize_seed: cli.randomize,
        trace_path: cli.trace_path.clone(),
        dump_path: cli.dump_path.clone(),
        live_target,
        iterations: driver::DEFAULT_ITERATIONS,
        show_rss: cli.rss,
    };

    let mut driver = driver::Driver::new(backend, config);
    match driver.run()? {
        driver::Outcome::IterationCapReached | driver::Outcome::TraceExhausted => Ok(()),
    }
}

fn build_backend_name(cli: &Cli) -> String {
    let inner = match cli.backend {
        Backend::Dl => "dl",
        Backend::Mini => "mini",
        Backend::Je => "je",
        Backend::Buddy => "buddy",
    };
    if cli.chunky {
        format!("chunky:{inner}")
    } else {
        inner.to_string()
    }
}
