//! Cross-cutting tagged-union vocabulary shared by every subsystem: cursor
//! direction, comparison/branch kinds, architecture/tracer selection, process
//! exit classification, and the `BranchInfo`/`BranchPoint` pair that a single
//! dynamic branch is keyed and sampled by.
//!
use serde::{Deserialize, Serialize};

use crate::bigint::BigInt;

/// Which way a seed's byte cursor is walking, or whether it is pinned.
///
/// `Stay` is a valid cursor state but an invalid argument to the
/// direction-sensitive `Seed` queries (`query_len_toward`, `query_update_bound`,
/// `query_neighbor_bytes`, `constrain_byte_at`, `fix_cur_bytes`) — those
/// reject it with `Error::InvalidArgument`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Stay,
}

/// The three comparison shapes a branch's operands were observed under.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CompareType {
    Equality,
    SignedSize,
    UnsignedSize,
}

/// Whether a branch operand should be read as two's-complement signed or
/// as a plain unsigned magnitude. Distinct from `CompareType` because a
/// `SignedSize`/`UnsignedSize` branch fixes this for the whole triple, while
/// `Sign` (below) describes the runtime sign of one observed value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// Runtime sign of a single sampled operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Sign {
    Positive,
    Negative,
    Zero,
}

/// How a traced execution terminated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    Error,
    Normal,
    SigIll,
    SigAbrt,
    SigFpe,
    SigSegv,
    SigAlrm,
}

impl Signal {
    /// `true` for the three signals `test_case::save` files under `crashes/`.
    #[must_use]
    pub fn is_crash(self) -> bool {
        matches!(self, Signal::SigSegv | Signal::SigIll | Signal::SigAbrt)
    }

    #[must_use]
    pub fn is_segfault(self) -> bool {
        matches!(self, Signal::SigSegv)
    }

    #[must_use]
    pub fn is_illegal(self) -> bool {
        matches!(self, Signal::SigIll)
    }

    #[must_use]
    pub fn is_fpe(self) -> bool {
        matches!(self, Signal::SigFpe)
    }

    #[must_use]
    pub fn is_abort(self) -> bool {
        matches!(self, Signal::SigAbrt)
    }

    /// `true` for the `exec_timeout` expiry classification `test_case::save`
    /// files under `hangs/`.
    #[must_use]
    pub fn is_timeout(self) -> bool {
        matches!(self, Signal::SigAlrm)
    }
}

/// Target architecture the QEMU tracer was built for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Arch {
    X86,
    X64,
}

/// Which of the three instrumented tracer binaries to launch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tracer {
    Coverage,
    Branch,
    BBCount,
}

impl Tracer {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tracer::Coverage => "Coverage",
            Tracer::Branch => "Branch",
            Tracer::BBCount => "BBCount",
        }
    }
}

/// Result of comparing one run's coverage bitmap against the fuzzer's
/// global bitmap. Drives both queue priority (`Priority::of_coverage_gain`)
/// and whether a seed is persisted under `<out_dir>/queue/`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CoverageGain {
    NoGain,
    NewPath,
    NewEdge,
}

/// Seed-queue tier. `Favored` is always popped ahead of `Normal`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Priority {
    Favored,
    Normal,
}

impl Priority {
    /// `NewEdge -> Favored`, `NewPath -> Normal`, `NoGain -> None` (nothing
    /// gets enqueued).
    #[must_use]
    pub fn of_coverage_gain(gain: CoverageGain) -> Option<Priority> {
        match gain {
            CoverageGain::NoGain => None,
            CoverageGain::NewPath => Some(Priority::Normal),
            CoverageGain::NewEdge => Some(Priority::Favored),
        }
    }
}

/// Operand width, in bytes, a branch's compared values were read at.
pub type OperandSize = u8;

/// One dynamic branch, sampled during a single traced execution.
///
/// `try_value`/`distance` are `BigInt` (not `u64`) because the tracer may
/// report a wrap-adjusted distance that briefly needs a 65th bit, and the
/// modeler's exactness checks must stay exact across that width. Both
/// serialize as decimal strings in JSON for the same reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub inst_addr: u64,
    pub branch_type: CompareType,
    pub try_value: BigInt,
    pub operand_size: OperandSize,
    pub operand1: u64,
    pub operand2: u64,
    pub distance: BigInt,
}

/// Identifies one dynamic branch location: instruction address plus a
/// per-PC visit counter (the same PC hit a second time at a different loop
/// iteration is a different `BranchPoint`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchPoint {
    pub addr: u64,
    pub idx: u32,
}

pub mod branch_info {
    use super::{BigInt, Signedness};

    /// Reinterprets a raw `u64` operand as a signed or unsigned `BigInt` of
    /// `size` bytes. For `Signed`, values above the signed max of that width
    /// are folded back across zero by subtracting `2^(8*size)` — two's
    /// complement decoding done in arbitrary precision rather than relying
    /// on a fixed native integer width wrapping correctly.
    #[must_use]
    pub fn interpret_as(sign: Signedness, size: u8, x: u64) -> BigInt {
        match sign {
            Signedness::Unsigned => BigInt::from(x),
            Signedness::Signed => {
                let signed_max = signed_max(size);
                if BigInt::from(x) > signed_max {
                    BigInt::from(x) - unsigned_max(size) - BigInt::from(1u64)
                } else {
                    BigInt::from(x)
                }
            }
        }
    }

    /// `2^(8*size - 1) - 1`: the largest value a `size`-byte signed integer
    /// can hold.
    #[must_use]
    pub fn signed_max(size: u8) -> BigInt {
        BigInt::power_of_two(8 * u32::from(size) - 1) - BigInt::from(1u64)
    }

    /// `2^(8*size) - 1`: the largest value a `size`-byte unsigned integer
    /// can hold.
    #[must_use]
    pub fn unsigned_max(size: u8) -> BigInt {
        BigInt::power_of_two(8 * u32::from(size)) - BigInt::from(1u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_gain_maps_to_priority() {
        assert_eq!(Priority::of_coverage_gain(CoverageGain::NoGain), None);
        assert_eq!(Priority::of_coverage_gain(CoverageGain::NewPath), Some(Priority::Normal));
        assert_eq!(Priority::of_coverage_gain(CoverageGain::NewEdge), Some(Priority::Favored));
    }

    #[test]
    fn signal_classification() {
        assert!(Signal::SigSegv.is_crash());
        assert!(Signal::SigIll.is_crash());
        assert!(Signal::SigAbrt.is_crash());
        assert!(!Signal::Normal.is_crash());
        assert!(Signal::SigAlrm.is_timeout());
    }

    #[test]
    fn interpret_as_signed_folds_across_zero() {
        // byte 0xFF as a signed 1-byte value is -1.
        let v = branch_info::interpret_as(Signedness::Signed, 1, 0xFF);
        assert_eq!(v, BigInt::from(0u64) - BigInt::from(1u64));
    }

    #[test]
    fn interpret_as_unsigned_is_identity() {
        let v = branch_info::interpret_as(Signedness::Unsigned, 1, 0xFF);
        assert_eq!(v, BigInt::from(255u64));
    }

    #[test]
    fn branch_info_json_round_trip() {
        let b = BranchInfo {
            inst_addr: 0x4000,
            branch_type: CompareType::Equality,
            try_value: BigInt::from(0x41u64),
            operand_size: 1,
            operand1: 0x41,
            operand2: 0x41,
            distance: BigInt::from(0u64),
        };
        let json = serde_json::to_string(&b).unwrap();
        let back: BranchInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }

    #[test]
    fn branch_point_is_hashable_key() {
        use alloc::collections::BTreeMap;
        let mut m = BTreeMap::new();
        // BranchPoint needs Ord for a BTreeMap key in practice it's used with
        // a HashMap; this just exercises Eq/Hash wiring via a linear scan.
        let points = [BranchPoint { addr: 1, idx: 0 }, BranchPoint { addr: 1, idx: 1 }];
        assert_ne!(points[0], points[1]);
        m.insert(0u32, points[0]);
        assert_eq!(m[&0], points[0]);
    }
}
