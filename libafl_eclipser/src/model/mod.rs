//! Grey-box branch modeling: turning three or more `(try_value, operand)`
//! samples of one branch into a closed-form description of how the operand
//! responds to the tried byte, without symbolic execution.
//!
//! Each sibling module owns one model shape: `linearity` is the shared
//! slope-inference core; `linear_equation`, `linear_inequality`,
//! `monotonicity` build on it.

use alloc::vec::Vec;

use crate::branch::Direction;

pub mod linear_equation;
pub mod linear_inequality;
pub mod linearity;
pub mod monotonicity;

/// Bytes adjacent to the cursor, supplied by [`crate::seed::Seed::query_neighbor_bytes`],
/// plus the direction they were gathered in. Every chunk-concatenation
/// routine in this module takes one of these instead of a whole `Seed`.
#[derive(Clone, Debug)]
pub struct Context {
    pub bytes: Vec<u8>,
    pub byte_dir: Direction,
}
