//! The byte-value lattice: what the fuzzer currently believes about one
//! byte of the input, and how free it still is to change.
//!
use alloc::format;
use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Where an input byte's concrete range comes from.
///
/// Concretization range depends on this: bytes fed through stdin are
/// restricted to the 7-bit ASCII-ish range many libc `getchar`-style readers
/// accept cleanly, while a byte written into a seed file can be anything.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum InputSource {
    StdInput,
    FileInput { filepath: String },
}

impl InputSource {
    /// `(low, high)` inclusive range a concrete byte may take under this source.
    #[must_use]
    pub fn byte_range(&self) -> (u8, u8) {
        match self {
            InputSource::StdInput => (0, 127),
            InputSource::FileInput { .. } => (0, 255),
        }
    }
}

/// One byte's position in the five-variant lattice.
///
/// `Fixed`/`Interval` are *constrained*: a solver may only narrow them
/// further, never overwrite them outright. `Untouched`/`Undecided`/`Sampled`
/// are *unfixed*: free for `fix_cur_bytes` to overwrite wholesale. This split
/// is what `Seed::query_update_bound` walks to find how large a chunk a solver
/// may propose at the cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ByteVal {
    /// Never read by any branch seen so far; concretizes to the byte the
    /// seed was initialized or loaded with.
    Untouched { v: u8 },
    /// A placeholder written by `fix_cur_bytes` padding past the seed's
    /// original length; semantically identical to `Untouched` except for
    /// the tag, kept separate to distinguish "never seen" from "synthesized
    /// while extending."
    Undecided { v: u8 },
    /// Currently holds a value drawn during an `n_spawn` sampling round.
    /// Treated as quasi-fixed by neighbor queries: it already carries
    /// observational weight, so the solver shouldn't casually clobber it
    /// while scanning for chunk material.
    Sampled { v: u8 },
    /// Constrained to `[low, high]` by a prior solve; concretizes to the
    /// midpoint, rounding down.
    Interval { low: u8, high: u8 },
    /// Pinned to an exact value by prior evidence (e.g. a successful
    /// equation solve); never overwritten, only ever re-`Fixed` to the same
    /// kind of constraint.
    Fixed { v: u8 },
}

impl ByteVal {
    /// The concrete byte this lattice value currently represents.
    #[must_use]
    pub fn concretize(&self) -> u8 {
        match self {
            ByteVal::Untouched { v }
            | ByteVal::Undecided { v }
            | ByteVal::Sampled { v }
            | ByteVal::Fixed { v } => *v,
            ByteVal::Interval { low, high } => low + (high - low) / 2,
        }
    }

    /// `true` for `Fixed`/`Interval`: a solver may narrow but never overwrite these.
    #[must_use]
    pub fn is_constrained(&self) -> bool {
        matches!(self, ByteVal::Fixed { .. } | ByteVal::Interval { .. })
    }

    /// `true` for `Untouched`/`Undecided`/`Sampled`: free to overwrite wholesale.
    #[must_use]
    pub fn is_unfixed(&self) -> bool {
        !self.is_constrained()
    }

    /// `true` if this byte's concrete value is zero.
    #[must_use]
    pub fn is_null_byte(&self) -> bool {
        self.concretize() == 0
    }

    /// The `(low, high)` bound this value's concretization is guaranteed to
    /// fall within, additionally clamped to `src`'s allowed byte range.
    #[must_use]
    pub fn min_max(&self, src: &InputSource) -> (u8, u8) {
        let (src_lo, src_hi) = src.byte_range();
        let (lo, hi) = match self {
            ByteVal::Fixed { v } => (*v, *v),
            ByteVal::Interval { low, high } => (*low, *high),
            ByteVal::Untouched { .. } | ByteVal::Undecided { .. } | ByteVal::Sampled { .. } => {
                (0, 255)
            }
        };
        (lo.max(src_lo), hi.min(src_hi))
    }

    /// Builds a constrained value from a `[lo, hi]` range, as used by
    /// `Seed::constrain_byte_at`: collapses to `Fixed` when the range is a
    /// single point.
    #[must_use]
    pub fn from_range(lo: u8, hi: u8) -> Self {
        if lo == hi {
            ByteVal::Fixed { v: lo }
        } else {
            ByteVal::Interval { low: lo, high: hi }
        }
    }

    /// Dense one-token textual form: `Fixed` gets a `!` prefix, `Interval`
    /// prints `@(lo,hi)`, `Undecided`
    /// is tagged `?`, `Sampled` is tagged `*`, and `Untouched` prints bare
    /// two-digit hex (the common case, kept unadorned for readability in
    /// dumps).
    #[must_use]
    pub fn to_tagged_string(&self) -> String {
        match self {
            ByteVal::Untouched { v } => format!("{v:02x}"),
            ByteVal::Undecided { v } => format!("?{v:02x}"),
            ByteVal::Sampled { v } => format!("*{v:02x}"),
            ByteVal::Interval { low, high } => format!("@({low:02x},{high:02x})"),
            ByteVal::Fixed { v } => format!("!{v:02x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concretize_matches_stored_value() {
        assert_eq!(ByteVal::Fixed { v: 0x41 }.concretize(), 0x41);
        assert_eq!(ByteVal::Untouched { v: 0x00 }.concretize(), 0x00);
    }

    #[test]
    fn concretize_interval_is_midpoint() {
        assert_eq!(ByteVal::Interval { low: 0x10, high: 0x20 }.concretize(), 0x18);
    }

    #[test]
    fn min_max_within_bounds_for_all_variants() {
        let src = InputSource::FileInput { filepath: "x".into() };
        for b in [
            ByteVal::Untouched { v: 5 },
            ByteVal::Undecided { v: 5 },
            ByteVal::Sampled { v: 5 },
            ByteVal::Interval { low: 10, high: 20 },
            ByteVal::Fixed { v: 42 },
        ] {
            let (lo, hi) = b.min_max(&src);
            let c = b.concretize();
            assert!(lo <= c && c <= hi, "{b:?} concretized to {c} outside [{lo},{hi}]");
        }
    }

    #[test]
    fn stdin_source_clamps_to_7_bit() {
        let src = InputSource::StdInput;
        let (_, hi) = ByteVal::Untouched { v: 200 }.min_max(&src);
        assert_eq!(hi, 127);
    }

    #[test]
    fn constrained_vs_unfixed_classification() {
        assert!(ByteVal::Fixed { v: 1 }.is_constrained());
        assert!(ByteVal::Interval { low: 0, high: 1 }.is_constrained());
        assert!(!ByteVal::Untouched { v: 1 }.is_constrained());
        assert!(!ByteVal::Undecided { v: 1 }.is_constrained());
        assert!(!ByteVal::Sampled { v: 1 }.is_constrained());
    }

    #[test]
    fn from_range_collapses_to_fixed_on_single_point() {
        assert_eq!(ByteVal::from_range(5, 5), ByteVal::Fixed { v: 5 });
        assert_eq!(ByteVal::from_range(5, 9), ByteVal::Interval { low: 5, high: 9 });
    }

    #[test]
    fn json_round_trip() {
        for b in [
            ByteVal::Untouched { v: 1 },
            ByteVal::Undecided { v: 2 },
            ByteVal::Sampled { v: 3 },
            ByteVal::Interval { low: 4, high: 9 },
            ByteVal::Fixed { v: 10 },
        ] {
            let json = serde_json::to_string(&b).unwrap();
            let back: ByteVal = serde_json::from_str(&json).unwrap();
            assert_eq!(b, back);
        }
    }
}
