//! Utilities for working with raw byte units.

use std::fmt;

/// `1 KiB`
pub const KIB: usize = 1 << 10;
/// `1 MiB`
pub const MIB: usize = 1 << 20;
/// `1 GiB`
pub const GIB: usize = 1 << 30;
/// `1 TiB`
pub const TIB: usize = 1 << 40;

/// Wrapper around a raw byte count that pretty-prints it using the
/// [`Display`](std::fmt::Display) implementation.
#[derive(Debug, Clone, Copy)]
pub struct ByteUnit(pub usize);

/// Shorthand for [`ByteUnit`] construction, mirroring the teacher's `unit::bytes` helper.
pub fn bytes(n: usize) -> ByteUnit {
    ByteUnit(n)
}

impl fmt::Display for ByteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0 as f64;

        match self.0 {
            0..=1_023 => write!(f, "{} B", self.0),
            1_024..=1_048_575 => write!(f, "{:.2} KiB", count / KIB as f64),
            1_048_576..=1_073_741_823 => write!(f, "{:.2} MiB", count / MIB as f64),
            1_073_741_824..=1_099_511_627_775 => write!(f, "{:.2} GiB", count / GIB as f64),
            _ => write!(f, "{:.2} TiB", count / TIB as f64),
        }
    }
}
