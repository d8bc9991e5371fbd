//! The workload driver: fills a live-bytes target, periodically bumps and
//! reports, drains randomly, or replays a recorded trace.
//!
//! Grounded on `original_source/main.c`'s main loop (`ALLOCATE_UNTIL_MB`
//! fill, `bump_sizes`, `print_current_stats`, the downward drain scan, and
//! `do_simulate_dump` for trace replay). The two "suspicious but
//! intentional" behaviours noted there are preserved verbatim: the drain
//! phase only walks the slots the fill phase touched this round (not the
//! whole table), and a bumped blob's slot is left empty rather than
//! retried if reallocating it would cross the live-bytes target.

use crate::backend::Allocator;
use crate::error::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Default live-bytes target, matching the C original's
/// `ALLOCATE_UNTIL_MB = ((1200 + 15) / 16 * 16 - 1)` MiB (1199, not 1200 —
/// the round-down-to-16-then-subtract-one is preserved verbatim rather
/// than simplified away). Overridable per [`Config`] for tests.
pub const DEFAULT_LIVE_MIB: u64 = (1200 + 15) / 16 * 16 - 1;

/// How many iterations separate a bump/report pass.
pub const PERIOD: u64 = 100_000;

/// Iteration cap of the steady-state loop, matching the C original's
/// `for (times = 100000000; times >= 0; times--)`.
pub const DEFAULT_ITERATIONS: u64 = 100_000_001;

/// Per-mille probability a live slot is freed during one drain pass.
const DRAIN_PER_MILLE: u32 = 5;

pub struct Config {
    pub minimal_size: usize,
    pub size_range: usize,
    pub bump_enabled: bool,
    pub randomize_seed: bool,
    pub trace_path: Option<PathBuf>,
    pub dump_path: Option<PathBuf>,
    pub live_target: u64,
    pub iterations: u64,
    pub show_rss: bool,
}

impl Config {
    fn max_bump_size(&self) -> usize {
        self.minimal_size + self.size_range
    }

    fn bump_eligibility_threshold(&self) -> usize {
        self.minimal_size + self.size_range / 2
    }
}

struct Blob {
    ptr: std::ptr::NonNull<u8>,
    size: usize,
}

/// Outcome of a completed run, for the binary to translate into an exit code.
pub enum Outcome {
    IterationCapReached,
    TraceExhausted,
}

pub struct Driver {
    backend: Box<dyn Allocator>,
    config: Config,
    slots: Vec<Option<Blob>>,
    rng: StdRng,
    live_bytes: u64,
    max_waste_pct: f64,
    dumped: bool,
}

impl Driver {
    pub fn new(backend: Box<dyn Allocator>, config: Config) -> Self {
        let slot_count = ((config.live_target / config.minimal_size as u64) as usize)
            .saturating_mul(2)
            .max(1024);
        let rng = if config.randomize_seed {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(0)
        };
        let mut slots = Vec::with_capacity(slot_count);
        slots.resize_with(slot_count, || None);
        Self {
            backend,
            config,
            slots,
            rng,
            live_bytes: 0,
            max_waste_pct: 0.0,
            dumped: false,
        }
    }

    pub fn run(&mut self) -> Result<Outcome, Error> {
        if let Some(path) = self.config.trace_path.clone() {
            self.replay_trace(&path)?;
            return Ok(Outcome::TraceExhausted);
        }

        for iteration in 0..self.config.iterations {
            let fill_cursor = self.fill_phase()?;

            if self.config.bump_enabled && iteration % PERIOD == 0 {
                self.bump_phase();
            }
            if iteration % PERIOD == 0 {
                self.report();
            }

            self.drain_phase(fill_cursor);
        }

        Ok(Outcome::IterationCapReached)
    }

    /// Scan slots from the start, filling empty ones, until live bytes
    /// reach the target. Returns the first index past the last slot this
    /// pass touched — the drain phase below only ever looks at that range.
    fn fill_phase(&mut self) -> Result<usize, Error> {
        let mut i = 0;
        while self.live_bytes < self.config.live_target {
            if i >= self.slots.len() {
                return Err(Error::TooSuccessfulAllocation);
            }
            if self.slots[i].is_none() {
                let size = self.config.minimal_size + self.rng.gen_range(0..self.config.size_range);
                let ptr = self.backend.alloc(size);
                self.live_bytes += size as u64;
                self.slots[i] = Some(Blob { ptr, size });
            }
            i += 1;
        }
        Ok(i)
    }

    fn bump_phase(&mut self) {
        // The chunk dump is taken before any blob is touched this round,
        // and only on the first qualifying bump pass — mirroring the C
        // original's `if (dump_first_path) { dump_chunks(...); dump_first_path
        // = NULL; } bump_sizes();` ordering.
        if !self.dumped {
            if let Some(path) = self.config.dump_path.clone() {
                if let Err(e) = self.dump_chunks(&path) {
                    log::warn!("chunk dump to {} failed: {e}", path.display());
                }
            }
            self.dumped = true;
        }

        let threshold = self.config.bump_eligibility_threshold();
        let max_size = self.config.max_bump_size();

        for slot in self.slots.iter_mut() {
            let Some(blob) = slot else { continue };
            if blob.size > threshold {
                continue;
            }
            let old_size = blob.size;
            let grown = (old_size + (old_size >> 8)).min(max_size);
            if grown == old_size {
                continue;
            }

            unsafe { self.backend.free(blob.ptr, old_size) };
            self.live_bytes -= old_size as u64;
            *slot = None;

            // The gate checks the post-free running total alone, never the
            // size being grown into (`original_source/main.c`'s `if
            // (usefully_allocated < (ALLOCATE_UNTIL_MB * 1048576))`), so a
            // large `grown` can still be allocated even once it would push
            // live bytes past the target.
            if self.live_bytes < self.config.live_target {
                let ptr = self.backend.alloc(grown);
                self.live_bytes += grown as u64;
                *slot = Some(Blob { ptr, size: grown });
            }
            // Else: the slot is left empty this round rather than retried
            // at the old size — the live-bytes bound already dropped once
            // the old blob was freed, and this keeps that drop rather than
            // backfilling it immediately.
        }
    }

    /// Walk the slots the fill phase touched this round, downward,
    /// randomly freeing live ones.
    fn drain_phase(&mut self, fill_cursor: usize) {
        for i in (0..fill_cursor).rev() {
            if self.slots[i].is_none() {
                continue;
            }
            if self.rng.gen_range(0..1000) < DRAIN_PER_MILLE {
                let blob = self.slots[i].take().unwrap();
                unsafe { self.backend.free(blob.ptr, blob.size) };
                self.live_bytes -= blob.size as u64;
            }
        }
    }

    fn report(&mut self) {
        let os_bytes = self.backend.total_allocated_bytes();
        let useful = self.live_bytes;
        let waste_pct = if os_bytes > 0 {
            (os_bytes as f64 - useful as f64) / os_bytes as f64 * 100.0
        } else {
            0.0
        };
        if waste_pct > self.max_waste_pct {
            self.max_waste_pct = waste_pct;
        }
        let live_count = self.slots.iter().filter(|s| s.is_some()).count();

        println!("stats:");
        println!("got from OS: {}", os_bytes);
        println!("App allocated: {}", useful);
        println!("Allocations count:{}", live_count);
        println!("waste {:.2} {:.2} %", waste_pct, self.max_waste_pct);
        if self.config.show_rss {
            match crate::os::rss_bytes() {
                Some(rss) => println!("rss: {}", crate::unit::bytes(rss as usize)),
                None => log::warn!("rss unavailable on this platform"),
            }
        }
    }

    fn dump_chunks(&self, path: &Path) -> Result<(), Error> {
        use std::io::Write;
        let mut out = std::fs::File::create(path)?;
        for slot in self.slots.iter().flatten() {
            let mut wrote_any = false;
            self.backend.iterate_chunks(slot.ptr, slot.size, &mut |ptr, len| {
                wrote_any = true;
                let _ = writeln!(out, "{:016x} {:x}", ptr.as_ptr() as usize, len);
            });
            if !wrote_any {
                writeln!(out, "{:016x} {:x}", slot.ptr.as_ptr() as usize, slot.size)?;
            }
        }
        Ok(())
    }

    fn replay_trace(&mut self, path: &Path) -> Result<(), Error> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; 8];
        loop {
            match read_exact_or_eof(&mut file, &mut buf)? {
                false => break,
                true => {}
            }
            let slot = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
            let len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
            if len < 128 {
                continue;
            }
            if slot >= self.slots.len() {
                continue;
            }
            if let Some(blob) = self.slots[slot].take() {
                unsafe { self.backend.free(blob.ptr, blob.size) };
                self.live_bytes -= blob.size as u64;
            }
            let ptr = self.backend.alloc(len);
            self.live_bytes += len as u64;
            self.slots[slot] = Some(Blob { ptr, size: len });
        }
        log::info!("trace replay reached EOF");
        self.report();
        if self.config.bump_enabled {
            self.bump_phase();
        }
        Ok(())
    }
}

/// Reads exactly `buf.len()` bytes, or reports clean EOF if zero bytes
/// were available before the first read — any other short read is an error.
fn read_exact_or_eof(file: &mut File, buf: &mut [u8]) -> Result<bool, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short read on trace record",
            )));
        }
        filled += n;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dl_backend::DlBackend;

    fn test_config(live_target: u64) -> Config {
        Config {
            minimal_size: 128,
            size_range: 256,
            bump_enabled: true,
            randomize_seed: false,
            trace_path: None,
            dump_path: None,
            live_target,
            iterations: 3,
            show_rss: false,
        }
    }

    #[test]
    fn fill_phase_reaches_target_without_exceeding_slot_table() {
        let mut d = Driver::new(Box::new(DlBackend::new()), test_config(64 * 1024));
        let cursor = d.fill_phase().unwrap();
        assert!(d.live_bytes >= d.config.live_target);
        assert!(cursor > 0);
    }

    #[test]
    fn deterministic_seed_gives_identical_live_bytes_across_runs() {
        let mut a = Driver::new(Box::new(DlBackend::new()), test_config(32 * 1024));
        let mut b = Driver::new(Box::new(DlBackend::new()), test_config(32 * 1024));
        a.fill_phase().unwrap();
        b.fill_phase().unwrap();
        assert_eq!(a.live_bytes, b.live_bytes);
    }

    #[test]
    fn drain_only_touches_the_slots_fill_just_used() {
        let mut d = Driver::new(Box::new(DlBackend::new()), test_config(8 * 1024));
        let cursor = d.fill_phase().unwrap();
        let touched_live_before: Vec<bool> = d.slots[..cursor].iter().map(|s| s.is_some()).collect();
        d.drain_phase(cursor);
        // Everything at or beyond the cursor was never touched by fill, so
        // it must remain untouched by drain too.
        assert!(d.slots[cursor..].iter().all(|s| s.is_none()));
        assert_eq!(touched_live_before.len(), cursor);
    }

    #[test]
    fn bump_grows_small_blobs_up_to_the_configured_ceiling() {
        let mut d = Driver::new(Box::new(DlBackend::new()), test_config(64 * 1024));
        d.fill_phase().unwrap();
        let before: Vec<usize> = d.slots.iter().flatten().map(|b| b.size).collect();
        d.bump_phase();
        let after: Vec<usize> = d.slots.iter().flatten().map(|b| b.size).collect();
        assert!(after.iter().any(|&s| !before.contains(&s)) || before.is_empty());
    }
}
