//! Top-level error type the binary surfaces at its boundary, mirroring
//! the teacher's `FatalError` in `crates/kernel/src/main.rs`: every
//! fallible module defines its own narrow error enum, and this one
//! collects them for `main` to report and map to an exit code.

displaydoc_lite::displaydoc! {
    #[derive(Debug)]
    pub enum Error {
        /// {0}
        Io(std::io::Error),
        /// argument error: {0}
        Cli(String),
        /// live allocation count exceeded the configured slot table
        TooSuccessfulAllocation,
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    /// Process exit code for this error, per §7's error-kind table.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Cli(_) => 1,
            Error::TooSuccessfulAllocation => 1,
            Error::Io(_) => 70,
        }
    }
}
