//! Ambient logging for the workbench: merges two distinct logging idioms
//! the teacher repo keeps separate. `src/print.rs`'s `Logger` implements
//! `log::Log` directly (install once with `log::set_logger`, format
//! `"[ {level} ] [{module}] {args}"`) but never touches `owo-colors`.
//! `crates/kernel/src/log.rs` is the one that colorizes each level tag
//! with `owo-colors` and prints an elapsed-time prefix — but it's a
//! hand-rolled macro dispatcher (`$crate::log!`) that never goes through
//! the `log` facade crate at all. This module is neither file ported
//! whole; it's `print.rs`'s `log::Log` impl carrying `log.rs`'s coloring
//! and timestamp formatting. The one further change from `log.rs` is the
//! clock: there is no `arch::time()` here, so elapsed time is measured
//! from process start with [`std::time::Instant`] instead of a hardware
//! timer read.
//!
//! Call sites use the `log` crate's own `debug!`/`info!`/`warn!`/`error!`
//! macros directly; this module only installs the logger that decides
//! how those macros' output gets rendered.

use log::{Level, Log, Metadata, Record};
use owo_colors::{colors, OwoColorize};
use std::sync::OnceLock;
use std::time::Instant;

struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = start_time().elapsed();
        let tag = record.level().to_string();
        let module = record.module_path().unwrap_or("<n/a>");

        eprintln!(
            "{} {:>5} {} > {}",
            format_args!("[{:>6}.{:<03}]", elapsed.as_secs(), elapsed.subsec_millis()).dimmed(),
            colorize(record.level(), &tag),
            module,
            record.args()
        );
    }

    fn flush(&self) {}
}

fn colorize(level: Level, tag: &str) -> String {
    match level {
        Level::Error => tag.fg::<colors::Red>().to_string(),
        Level::Warn => tag.fg::<colors::Yellow>().to_string(),
        Level::Info => tag.fg::<colors::Cyan>().to_string(),
        Level::Debug => tag.fg::<colors::Magenta>().to_string(),
        Level::Trace => tag.fg::<colors::BrightBlack>().to_string(),
    }
}

fn start_time() -> &'static Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now)
}

static LOGGER: Logger = Logger;

/// Install this module's colorized logger as the `log` crate's global
/// sink. Idempotent: a second call is a no-op rather than a panic, since
/// tests may construct multiple drivers in one process.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}
