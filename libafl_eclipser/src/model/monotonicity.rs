//! Monotonic fallback model: when a branch's operand doesn't fit a line but
//! still moves consistently in one direction as the try-value grows, track
//! an ever-narrowing bracketing interval around the target crossing.
//!
use alloc::vec::Vec;

use crate::bigint::BigInt;
use crate::branch::{branch_info, BranchInfo, CompareType, Signedness};
use crate::error::Error;

/// Direction a branch's operand has been observed moving as the try-value
/// increases.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Tendency {
    Incr,
    Decr,
    Undetermined,
}

/// A bracketing interval `(lower_x, upper_x)` known to straddle the
/// try-value that would make the operand equal `target_y`, refined one
/// observation at a time by [`update`].
#[derive(Clone, Debug, PartialEq)]
pub struct Monotonicity {
    pub lower_x: BigInt,
    pub lower_y: Option<BigInt>,
    pub upper_x: BigInt,
    pub upper_y: Option<BigInt>,
    pub target_y: BigInt,
    pub tendency: Tendency,
    pub byte_len: u32,
}

impl serde::Serialize for Monotonicity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Monotonicity", 7)?;
        s.serialize_field("type", "monotonicity")?;
        s.serialize_field("lower_x", &self.lower_x)?;
        if let Some(y) = &self.lower_y {
            s.serialize_field("lower_y", y)?;
        }
        s.serialize_field("upper_x", &self.upper_x)?;
        if let Some(y) = &self.upper_y {
            s.serialize_field("upper_y", y)?;
        }
        s.serialize_field("target_y", &self.target_y)?;
        s.serialize_field("tendency", &self.tendency)?;
        s.serialize_field("byte_len", &self.byte_len)?;
        s.end()
    }
}

impl<'de> serde::Deserialize<'de> for Monotonicity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            lower_x: BigInt,
            lower_y: Option<BigInt>,
            upper_x: BigInt,
            upper_y: Option<BigInt>,
            target_y: BigInt,
            tendency: Tendency,
            byte_len: u32,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Monotonicity {
            lower_x: raw.lower_x,
            lower_y: raw.lower_y,
            upper_x: raw.upper_x,
            upper_y: raw.upper_y,
            target_y: raw.target_y,
            tendency: raw.tendency,
            byte_len: raw.byte_len,
        })
    }
}

fn check_intermediate(tendency: Tendency, y1: &BigInt, y2: &BigInt, y3: &BigInt) -> Result<bool, Error> {
    match tendency {
        Tendency::Incr => Ok(y1 < y2 && y2 < y3),
        Tendency::Decr => Ok(y1 > y2 && y2 > y3),
        Tendency::Undetermined => Err(Error::unreachable("Invalid tendency input")),
    }
}

fn make(tendency: Tendency, a: BigInt, fa: BigInt, b: BigInt, fb: BigInt, k: BigInt) -> Monotonicity {
    Monotonicity {
        lower_x: a,
        lower_y: Some(fa),
        upper_x: b,
        upper_y: Some(fb),
        target_y: k,
        tendency,
        byte_len: 1,
    }
}

/// Walks `coordinates` (already sorted by `x`) checking whether they stay
/// consistent with a single tendency, tolerating one positive-to-negative
/// wrap in signed mode. Returns `None` the moment a pair breaks the pattern.
///
/// # Errors
/// Returns [`Error::Unreachable`] if `coordinates` is not strictly sorted by
/// `x`, or is empty.
pub fn check_monotonic(sign: Signedness, coordinates: &[(BigInt, BigInt)]) -> Result<Option<Tendency>, Error> {
    let Some((first, rest)) = coordinates.split_first() else {
        return Err(Error::unreachable("Empty coordinate list provided as input"));
    };
    let (mut prev_x, mut prev_y) = first.clone();
    let mut tendency = Tendency::Undetermined;

    for (x, y) in rest {
        if *x <= prev_x {
            return Err(Error::unreachable("Invalid coordinates"));
        }
        tendency = match tendency {
            Tendency::Incr if prev_y <= *y => Tendency::Incr,
            Tendency::Incr if sign == Signedness::Signed && !prev_y.is_negative() && !prev_y.is_zero() && y.is_negative() => {
                Tendency::Incr
            }
            Tendency::Decr if prev_y >= *y => Tendency::Decr,
            Tendency::Decr if sign == Signedness::Signed && prev_y.is_negative() && !y.is_negative() && !y.is_zero() => {
                Tendency::Decr
            }
            Tendency::Undetermined if prev_y == *y => Tendency::Undetermined,
            Tendency::Undetermined if prev_y < *y => Tendency::Incr,
            Tendency::Undetermined if prev_y > *y => Tendency::Decr,
            _ => return Ok(None),
        };
        prev_x = x.clone();
        prev_y = y.clone();
    }
    Ok(Some(tendency))
}

fn generate_aux(
    tendency: Tendency,
    targ_y: &BigInt,
    prev: (&BigInt, &BigInt),
    rest: &[(BigInt, BigInt)],
) -> Result<Option<Monotonicity>, Error> {
    let Some(((x, y), tail)) = rest.split_first() else {
        return Ok(None);
    };
    let (prev_x, prev_y) = prev;
    if *prev_y == *targ_y || *y == *targ_y {
        return Ok(None);
    }
    if check_intermediate(tendency, prev_y, targ_y, y)? {
        Ok(Some(make(tendency, prev_x.clone(), prev_y.clone(), x.clone(), y.clone(), targ_y.clone())))
    } else {
        generate_aux(tendency, targ_y, (x, y), tail)
    }
}

/// Finds the first consecutive pair of `coordinates` whose `y` values
/// straddle `targ_y` under `tendency`, and builds the initial
/// [`Monotonicity`] bracket from it.
///
/// # Errors
/// Returns [`Error::Unreachable`] if `tendency` is [`Tendency::Undetermined`].
pub fn generate(tendency: Tendency, targ_y: &BigInt, coordinates: &[(BigInt, BigInt)]) -> Result<Option<Monotonicity>, Error> {
    if tendency == Tendency::Undetermined {
        return Err(Error::unreachable("Invalid tendency input"));
    }
    let Some((first, rest)) = coordinates.split_first() else {
        return Ok(None);
    };
    generate_aux(tendency, targ_y, (&first.0, &first.1), rest)
}

/// Builds a monotonic model from a run of branch-info samples that share a
/// constant `operand1` or `operand2`: infers the tendency, then locates the
/// initial bracketing interval around the non-constant operand's target.
///
/// # Errors
/// Returns [`Error::Unreachable`] if `br_infos` is empty.
pub fn find(br_infos: &[BranchInfo]) -> Result<Option<Monotonicity>, Error> {
    let Some(head) = br_infos.first() else {
        return Err(Error::unreachable("Empty branchInfo list provided as input"));
    };
    let sign = if head.branch_type == CompareType::UnsignedSize { Signedness::Unsigned } else { Signedness::Signed };
    let size = head.operand_size;

    if br_infos.iter().all(|v| v.operand1 == head.operand1) {
        let target_y = branch_info::interpret_as(sign, size, head.operand1);
        let coordinates: Vec<(BigInt, BigInt)> = br_infos
            .iter()
            .map(|br| (br.try_value.clone(), branch_info::interpret_as(sign, size, br.operand2)))
            .collect();
        let Some(tendency) = check_monotonic(sign, &coordinates)? else {
            return Ok(None);
        };
        generate(tendency, &target_y, &coordinates)
    } else if br_infos.iter().all(|v| v.operand2 == head.operand2) {
        let target_y = branch_info::interpret_as(sign, size, head.operand2);
        let coordinates: Vec<(BigInt, BigInt)> = br_infos
            .iter()
            .map(|br| (br.try_value.clone(), branch_info::interpret_as(sign, size, br.operand1)))
            .collect();
        let Some(tendency) = check_monotonic(sign, &coordinates)? else {
            return Ok(None);
        };
        generate(tendency, &target_y, &coordinates)
    } else {
        Ok(None)
    }
}

/// Refines the bracket once it has collapsed to an adjacent-integer
/// interval: shifts both bounds left 8 bits (the upper bound also gains
/// `0xff`), bumps `byte_len`, and resets the observed `y` values so the next
/// sample re-establishes them at the new, finer resolution.
#[must_use]
pub fn adjust_byte_len(monotonic: Monotonicity) -> Monotonicity {
    if monotonic.upper_x.clone() - monotonic.lower_x.clone() > BigInt::from(1u64) {
        return monotonic;
    }
    let new_lower_x = monotonic.lower_x << 8;
    let new_upper_x = (monotonic.upper_x << 8) + BigInt::from(255u64);
    Monotonicity {
        lower_x: new_lower_x,
        lower_y: None,
        upper_x: new_upper_x,
        upper_y: None,
        byte_len: monotonic.byte_len + 1,
        ..monotonic
    }
}

/// Narrows the bracket with one new `(x, y)` observation, replacing whichever
/// bound `y` now falls on the same side of `target_y` as.
///
/// # Panics
/// Panics if `monotonic.tendency` is [`Tendency::Undetermined`]: a
/// `Monotonicity` value is only ever constructed with `Incr`/`Decr`.
#[must_use]
pub fn update_interval(monotonic: Monotonicity, x: BigInt, y: BigInt) -> Monotonicity {
    match monotonic.tendency {
        Tendency::Incr => {
            if y < monotonic.target_y {
                Monotonicity { lower_x: x, lower_y: Some(y), ..monotonic }
            } else {
                Monotonicity { upper_x: x, upper_y: Some(y), ..monotonic }
            }
        }
        Tendency::Decr => {
            if y < monotonic.target_y {
                Monotonicity { upper_x: x, upper_y: Some(y), ..monotonic }
            } else {
                Monotonicity { lower_x: x, lower_y: Some(y), ..monotonic }
            }
        }
        Tendency::Undetermined => unreachable!("Monotonicity is never constructed with an undetermined tendency"),
    }
}

/// [`update_interval`] followed by [`adjust_byte_len`].
#[must_use]
pub fn update(monotonic: Monotonicity, x: BigInt, y: BigInt) -> Monotonicity {
    adjust_byte_len(update_interval(monotonic, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::CompareType;

    fn br(try_value: u64, operand1: u64, operand2: u64) -> BranchInfo {
        BranchInfo {
            inst_addr: 0,
            branch_type: CompareType::UnsignedSize,
            try_value: BigInt::from(try_value),
            operand_size: 1,
            operand1,
            operand2,
            distance: BigInt::zero(),
        }
    }

    #[test]
    fn detects_increasing_tendency() {
        let coords = [
            (BigInt::from(1u64), BigInt::from(10u64)),
            (BigInt::from(2u64), BigInt::from(20u64)),
            (BigInt::from(3u64), BigInt::from(30u64)),
        ];
        let t = check_monotonic(Signedness::Unsigned, &coords).unwrap();
        assert_eq!(t, Some(Tendency::Incr));
    }

    #[test]
    fn non_monotonic_samples_return_none() {
        let coords = [
            (BigInt::from(1u64), BigInt::from(10u64)),
            (BigInt::from(2u64), BigInt::from(5u64)),
            (BigInt::from(3u64), BigInt::from(30u64)),
        ];
        let t = check_monotonic(Signedness::Unsigned, &coords).unwrap();
        assert_eq!(t, None);
    }

    #[test]
    fn find_brackets_target_crossing() {
        // operand1 is constant (the target, 15); operand2 rises through it.
        let br_infos = [br(1, 15, 10), br(2, 15, 20), br(3, 15, 40)];
        let m = find(&br_infos).unwrap().expect("operand2 crosses target 15 between samples 1 and 2");
        assert_eq!(m.tendency, Tendency::Incr);
        assert_eq!(m.target_y, BigInt::from(15u64));
        assert_eq!(m.lower_x, BigInt::from(1u64));
        assert_eq!(m.upper_x, BigInt::from(2u64));
    }

    #[test]
    fn find_returns_none_when_target_unreachable() {
        // operand2 never straddles 100 as try_value increases from 10..40.
        let br_infos = [br(1, 100, 10), br(2, 100, 20), br(3, 100, 40)];
        let m = find(&br_infos).unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn adjust_byte_len_refines_adjacent_interval() {
        let m = Monotonicity {
            lower_x: BigInt::from(5u64),
            lower_y: Some(BigInt::from(1u64)),
            upper_x: BigInt::from(6u64),
            upper_y: Some(BigInt::from(2u64)),
            target_y: BigInt::from(0u64),
            tendency: Tendency::Incr,
            byte_len: 1,
        };
        let refined = adjust_byte_len(m);
        assert_eq!(refined.byte_len, 2);
        assert!(refined.lower_y.is_none());
        assert_eq!(refined.lower_x, BigInt::from(5u64 * 256));
        assert_eq!(refined.upper_x, BigInt::from(6u64 * 256 + 255));
    }

    #[test]
    fn tendency_json_round_trips_decr_exactly() {
        let json = serde_json::to_string(&Tendency::Decr).unwrap();
        assert_eq!(json, "\"Decr\"");
    }
}
