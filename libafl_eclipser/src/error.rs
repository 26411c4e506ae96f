//! Error taxonomy for the grey-box concolic engine.
//!
//! Mirrors the shape of [`libafl_bolts::Error`]: a flat enum of named
//! constructors rather than a `thiserror` derive, because most call sites
//! want a short human message plus the file/line it was raised from.

use alloc::string::String;
use core::fmt::{self, Display, Formatter};

/// Errors produced by this crate.
///
/// `InvalidArgument`/`OutOfRange`/`ParseFailure` are recoverable: callers in
/// `concolic`/`fuzz` catch them and skip the offending branch or round.
/// `Unreachable` indicates a violated precondition in this crate's own code
/// (e.g. [`crate::model::linearity::find_common_slope`] called with samples
/// out of order) and should only ever be constructed right before a panic
/// unwinds past it in debug builds.
#[derive(Debug)]
pub enum Error {
    /// A direction of `Stay` where only `Left`/`Right` is valid, an empty
    /// byte vector at seed construction, or a chunk size larger than the
    /// allowed context.
    InvalidArgument(String, &'static str, u32),
    /// A cursor or index fell past the end of a byte sequence.
    OutOfRange(String, &'static str, u32),
    /// Fork, exec, pipe, or tracer I/O failure. Not recovered locally.
    ExecutionFailure(String, &'static str, u32),
    /// The target exceeded `exec_timeout`. Recovered by the caller.
    Timeout(String, &'static str, u32),
    /// Malformed JSON (or a missing field) in a branch-trace record.
    ParseFailure(String, &'static str, u32),
    /// A programmer-error invariant was violated.
    Unreachable(String, &'static str, u32),
}

impl Error {
    /// Creates a new `InvalidArgument` error.
    #[track_caller]
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        let loc = core::panic::Location::caller();
        Self::InvalidArgument(msg.into(), loc.file(), loc.line())
    }

    /// Creates a new `OutOfRange` error.
    #[track_caller]
    pub fn out_of_range<S: Into<String>>(msg: S) -> Self {
        let loc = core::panic::Location::caller();
        Self::OutOfRange(msg.into(), loc.file(), loc.line())
    }

    /// Creates a new `ExecutionFailure` error.
    #[track_caller]
    pub fn execution_failure<S: Into<String>>(msg: S) -> Self {
        let loc = core::panic::Location::caller();
        Self::ExecutionFailure(msg.into(), loc.file(), loc.line())
    }

    /// Creates a new `Timeout` error.
    #[track_caller]
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        let loc = core::panic::Location::caller();
        Self::Timeout(msg.into(), loc.file(), loc.line())
    }

    /// Creates a new `ParseFailure` error.
    #[track_caller]
    pub fn parse_failure<S: Into<String>>(msg: S) -> Self {
        let loc = core::panic::Location::caller();
        Self::ParseFailure(msg.into(), loc.file(), loc.line())
    }

    /// Creates a new `Unreachable` error. Most callers immediately `panic!`
    /// with this rather than propagate it; it exists as a typed value mainly
    /// so tests can assert which invariant tripped.
    #[track_caller]
    pub fn unreachable<S: Into<String>>(msg: S) -> Self {
        let loc = core::panic::Location::caller();
        Self::Unreachable(msg.into(), loc.file(), loc.line())
    }

    /// `true` for errors the main fuzz loop should treat as a recoverable
    /// one-bad-round rather than letting it propagate out.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(..) | Self::ParseFailure(..) | Self::InvalidArgument(..)
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (kind, msg, file, line) = match self {
            Self::InvalidArgument(m, file, line) => ("InvalidArgument", m, file, line),
            Self::OutOfRange(m, file, line) => ("OutOfRange", m, file, line),
            Self::ExecutionFailure(m, file, line) => ("ExecutionFailure", m, file, line),
            Self::Timeout(m, file, line) => ("Timeout", m, file, line),
            Self::ParseFailure(m, file, line) => ("ParseFailure", m, file, line),
            Self::Unreachable(m, file, line) => ("Unreachable", m, file, line),
        };
        write!(f, "{kind}: {msg} ({file}:{line})")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Error::execution_failure(alloc::format!("I/O error: {err}"))
    }
}

#[cfg(feature = "std")]
impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Error::parse_failure(alloc::format!("JSON error: {err}"))
    }
}
