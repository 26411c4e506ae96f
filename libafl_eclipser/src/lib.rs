//! Grey-box concolic fuzzing engine.
//!
//! Drives a target program by repeatedly constructing candidate inputs,
//! measuring runtime branch behavior through an instrumented QEMU tracer,
//! and fitting small numerical models of each branch condition to solve for
//! values that flip it.
//!
//! `std` (default) pulls in process spawning, filesystem I/O, and sleeping
//! for the executor/sync/scheduler/fuzz-loop modules; without it, only the
//! pure data model and branch-modeling math (`bigint`, `byteval`, `seed`,
//! `branch`, `model`, `options`, `queue`) are available, for embedding this
//! crate's solver math somewhere with no OS.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bigint;
pub mod branch;
pub mod byteval;
pub mod error;
pub mod model;
pub mod options;
pub mod queue;
pub mod scheduler;
pub mod seed;
pub mod solver;

// These need process spawning, filesystem access, or wall-clock time; each
// file gates itself with an inner `#![cfg(feature = "std")]` rather than
// being conditionally declared here, so that `cargo doc --all-features`
// and IDE tooling still see them.
pub mod concolic;
pub mod executor;
pub mod fuzz;
pub mod sync;
