//! A candidate input: a byte-value lattice vector plus a cursor that tracks
//! where the next solve attempt will act.
//!
//! Every mutator is exposed twice — an `_inplace` version and a functional
//! version that clones first — so callers that want persistent-style
//! branching (keep the old seed, try a mutation) don't have to clone
//! defensively themselves. The `_inplace` methods mutate `&mut self` and
//! return a plain success signal; the plain methods clone and return
//! `Option<Seed>`/`Seed` by value.

use alloc::string::String;
use alloc::vec::Vec;

use crate::branch::Direction;
use crate::byteval::{ByteVal, InputSource};
use crate::error::Error;
use crate::options::{INIT_INPUT_LEN, MAX_CHUNK_LEN};

/// A candidate input under construction: one [`ByteVal`] per byte, plus a
/// cursor (`cursor_pos`, `cursor_dir`) marking where the solver is currently
/// working.
///
/// Invariant: `cursor_pos < byte_vals.len()` holds after every mutating
/// operation that does not itself extend `byte_vals` (`fix_cur_bytes` is the
/// one operation allowed to grow the vector out from under the cursor).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Seed {
    byte_vals: Vec<ByteVal>,
    cursor_pos: usize,
    cursor_dir: Direction,
    source: InputSource,
}

impl Seed {
    /// Builds a fresh seed of [`INIT_INPUT_LEN`] bytes, all `Untouched`,
    /// seeded with `b'A'` for [`InputSource::StdInput`] (many `getchar`-style
    /// readers choke on a raw NUL as the very first byte) or `0` for
    /// [`InputSource::FileInput`].
    #[must_use]
    pub fn new(source: InputSource) -> Self {
        let fill = match source {
            InputSource::StdInput => b'A',
            InputSource::FileInput { .. } => 0,
        };
        Seed {
            byte_vals: alloc::vec![ByteVal::Untouched { v: fill }; INIT_INPUT_LEN],
            cursor_pos: 0,
            cursor_dir: Direction::Right,
            source,
        }
    }

    /// Builds a seed from caller-provided concrete bytes, each starting out
    /// `Untouched`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for empty `bytes`.
    pub fn with_bytes(source: InputSource, bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::invalid_argument("Seed::with_bytes() with empty bytes"));
        }
        Ok(Seed {
            byte_vals: bytes.iter().map(|&v| ByteVal::Untouched { v }).collect(),
            cursor_pos: 0,
            cursor_dir: Direction::Right,
            source,
        })
    }

    #[must_use]
    pub fn source(&self) -> &InputSource {
        &self.source
    }

    #[must_use]
    pub fn cursor_pos(&self) -> usize {
        self.cursor_pos
    }

    #[must_use]
    pub fn byte_vals(&self) -> &[ByteVal] {
        &self.byte_vals
    }

    /// The concrete bytes this seed currently represents.
    #[must_use]
    pub fn concretize(&self) -> Vec<u8> {
        self.byte_vals.iter().map(ByteVal::concretize).collect()
    }

    #[must_use]
    pub fn get_cur_byte_val(&self) -> ByteVal {
        self.byte_vals[self.cursor_pos]
    }

    #[must_use]
    pub fn get_cur_length(&self) -> usize {
        self.byte_vals.len()
    }

    /// Index of the first unfixed byte, scanning from the start.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if every byte is constrained.
    pub fn get_unfixed_byte_index(&self) -> Result<usize, Error> {
        self.byte_vals
            .iter()
            .position(ByteVal::is_unfixed)
            .ok_or_else(|| Error::out_of_range("no unfixed byte in seed"))
    }

    #[must_use]
    pub fn get_byte_cursor_dir(&self) -> Direction {
        self.cursor_dir
    }

    /// # Errors
    /// Returns [`Error::OutOfRange`] if `pos` is past the end.
    pub fn get_concrete_byte_at(&self, pos: usize) -> Result<u8, Error> {
        self.byte_vals
            .get(pos)
            .map(ByteVal::concretize)
            .ok_or_else(|| Error::out_of_range("pos >= byte_vals.len()"))
    }

    #[must_use]
    pub fn get_concrete_byte_at_cursor(&self) -> u8 {
        self.byte_vals[self.cursor_pos].concretize()
    }

    /// # Errors
    /// Returns [`Error::OutOfRange`] if `[pos, pos+len)` runs past the end.
    pub fn get_concrete_bytes_from(&self, pos: usize, len: usize) -> Result<Vec<u8>, Error> {
        if pos + len > self.byte_vals.len() {
            return Err(Error::out_of_range("pos + len > byte_vals.len()"));
        }
        Ok(self.byte_vals[pos..pos + len].iter().map(ByteVal::concretize).collect())
    }

    #[must_use]
    pub fn has_unfixed_byte(&self) -> bool {
        self.byte_vals.iter().any(ByteVal::is_unfixed)
    }

    #[must_use]
    pub fn is_unfixed_byte_at(&self, offset: usize) -> bool {
        self.byte_vals[offset].is_unfixed()
    }

    #[must_use]
    pub fn is_unfixed_byte_at_cursor(&self) -> bool {
        self.is_unfixed_byte_at(self.cursor_pos)
    }

    /// How many bytes remain between the cursor and the end of the seed in
    /// `direction`, inclusive of the byte under the cursor.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for `Direction::Stay`.
    pub fn query_len_toward(&self, direction: Direction) -> Result<usize, Error> {
        match direction {
            Direction::Right => Ok(self.byte_vals.len() - self.cursor_pos),
            Direction::Left => Ok(self.cursor_pos + 1),
            Direction::Stay => Err(Error::invalid_argument(
                "query_len_toward() cannot be called with Stay",
            )),
        }
    }

    fn query_update_bound_left(byte_vals: &[ByteVal], byte_cursor: usize) -> usize {
        let window = MAX_CHUNK_LEN + 1;
        let start = if byte_cursor > window { byte_cursor - window } else { 0 };
        let slice = &byte_vals[start..=byte_cursor];
        // Walk backward from the cursor; stop at the first Fixed byte.
        let dist = slice.iter().rev().position(ByteVal::is_constrained).unwrap_or(slice.len());
        dist.min(MAX_CHUNK_LEN)
    }

    fn query_update_bound_right(byte_vals: &[ByteVal], byte_cursor: usize) -> usize {
        let window = MAX_CHUNK_LEN + 1;
        let end = (byte_cursor + window).min(byte_vals.len());
        let slice = &byte_vals[byte_cursor..end];
        let dist = slice.iter().position(ByteVal::is_constrained).unwrap_or(slice.len());
        dist.min(MAX_CHUNK_LEN)
    }

    /// How many more bytes, starting at the cursor and walking toward
    /// `direction`, can be absorbed into one chunk before hitting a `Fixed`
    /// byte or [`MAX_CHUNK_LEN`], whichever is smaller.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for `Direction::Stay`.
    pub fn query_update_bound(&self, direction: Direction) -> Result<usize, Error> {
        match direction {
            Direction::Left => Ok(Self::query_update_bound_left(&self.byte_vals, self.cursor_pos)),
            Direction::Right => Ok(Self::query_update_bound_right(&self.byte_vals, self.cursor_pos)),
            Direction::Stay => Err(Error::invalid_argument(
                "query_update_bound() cannot be called with Stay",
            )),
        }
    }

    /// [`Self::query_update_bound`] using the seed's own `cursor_dir`.
    ///
    /// # Errors
    /// Propagates [`Error::InvalidArgument`] if `cursor_dir` is `Stay`.
    pub fn query_update_bound_cur(&self) -> Result<usize, Error> {
        self.query_update_bound(self.cursor_dir)
    }

    /// Up to `MAX_CHUNK_LEN + 1` concrete bytes adjacent to the cursor in
    /// `direction`, excluding the byte under the cursor itself.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for `Direction::Stay`.
    pub fn query_neighbor_bytes(&self, direction: Direction) -> Result<Vec<u8>, Error> {
        let len = MAX_CHUNK_LEN + 1;
        match direction {
            Direction::Right => {
                let upper = (self.cursor_pos + len).min(self.byte_vals.len());
                Ok(self.byte_vals[self.cursor_pos + 1..upper]
                    .iter()
                    .map(ByteVal::concretize)
                    .collect())
            }
            Direction::Left => {
                let lower = if self.cursor_pos > len { self.cursor_pos - len } else { 0 };
                if self.cursor_pos == 0 {
                    Ok(Vec::new())
                } else {
                    Ok(self.byte_vals[lower..self.cursor_pos].iter().map(ByteVal::concretize).collect())
                }
            }
            Direction::Stay => Err(Error::invalid_argument(
                "query_neighbor_bytes() cannot be called with Stay",
            )),
        }
    }

    /// [`Self::query_neighbor_bytes`] using the seed's own `cursor_dir`.
    ///
    /// # Errors
    /// Propagates [`Error::InvalidArgument`] if `cursor_dir` is `Stay`.
    pub fn query_neighbor_bytes_cur(&self) -> Result<Vec<u8>, Error> {
        self.query_neighbor_bytes(self.cursor_dir)
    }

    /// Replaces the byte at `cursor_pos ± offset` (toward `direction`) with
    /// `Fixed{low}` if `low == high`, else `Interval{low, high}`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for `Direction::Stay`.
    pub fn constrain_byte_at_inplace(
        &mut self,
        direction: Direction,
        offset: usize,
        low: u8,
        high: u8,
    ) -> Result<(), Error> {
        let byte_cursor = match direction {
            Direction::Right => self.cursor_pos + offset,
            Direction::Left => self.cursor_pos.checked_sub(offset).ok_or_else(|| {
                Error::out_of_range("constrain_byte_at() offset runs past the start")
            })?,
            Direction::Stay => {
                return Err(Error::invalid_argument(
                    "constrain_byte_at() cannot be called with Stay",
                ))
            }
        };
        self.byte_vals[byte_cursor] = ByteVal::from_range(low, high);
        Ok(())
    }

    /// Clone-and-mutate counterpart of [`Self::constrain_byte_at_inplace`].
    ///
    /// # Errors
    /// Propagates the same errors as [`Self::constrain_byte_at_inplace`].
    pub fn constrain_byte_at(
        &self,
        direction: Direction,
        offset: usize,
        low: u8,
        high: u8,
    ) -> Result<Self, Error> {
        let mut new_seed = self.clone();
        new_seed.constrain_byte_at_inplace(direction, offset, low, high)?;
        Ok(new_seed)
    }

    /// Writes `bytes` as `Fixed` values starting at the cursor toward
    /// `direction`, extending `byte_vals` with `Undecided{0}` padding if the
    /// write runs past the current end.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `direction == Left` and the
    /// write would start before index 0.
    pub fn fix_cur_bytes_inplace(&mut self, direction: Direction, bytes: &[u8]) -> Result<(), Error> {
        let n_bytes = bytes.len();
        let start_pos = match direction {
            Direction::Right => self.cursor_pos as isize,
            Direction::Left | Direction::Stay => {
                self.cursor_pos as isize - n_bytes as isize + 1
            }
        };
        if direction != Direction::Right && start_pos < 0 {
            return Err(Error::invalid_argument(
                "fix_cur_bytes() would start before the beginning of the seed",
            ));
        }
        let start_pos = start_pos as usize;
        if start_pos + n_bytes > self.byte_vals.len() {
            self.byte_vals.resize(start_pos + n_bytes, ByteVal::Undecided { v: 0 });
        }
        for (i, &b) in bytes.iter().enumerate() {
            self.byte_vals[start_pos + i] = ByteVal::Fixed { v: b };
        }
        Ok(())
    }

    /// Clone-and-mutate counterpart of [`Self::fix_cur_bytes_inplace`].
    ///
    /// # Errors
    /// Propagates the same errors as [`Self::fix_cur_bytes_inplace`].
    pub fn fix_cur_bytes(&self, direction: Direction, bytes: &[u8]) -> Result<Self, Error> {
        let mut new_seed = self.clone();
        new_seed.fix_cur_bytes_inplace(direction, bytes)?;
        Ok(new_seed)
    }

    /// [`Self::fix_cur_bytes_inplace`] using the seed's own `cursor_dir`.
    ///
    /// # Errors
    /// Propagates the same errors as [`Self::fix_cur_bytes_inplace`].
    pub fn fix_cur_bytes_inplace_cur(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.fix_cur_bytes_inplace(self.cursor_dir, bytes)
    }

    /// [`Self::fix_cur_bytes`] using the seed's own `cursor_dir`.
    ///
    /// # Errors
    /// Propagates the same errors as [`Self::fix_cur_bytes_inplace`].
    pub fn fix_cur_bytes_cur(&self, bytes: &[u8]) -> Result<Self, Error> {
        self.fix_cur_bytes(self.cursor_dir, bytes)
    }

    pub fn update_cur_byte_inplace(&mut self, byte_val: ByteVal) {
        self.byte_vals[self.cursor_pos] = byte_val;
    }

    #[must_use]
    pub fn update_cur_byte(&self, byte_val: ByteVal) -> Self {
        let mut new_seed = self.clone();
        new_seed.update_cur_byte_inplace(byte_val);
        new_seed
    }

    pub fn set_cursor_pos_inplace(&mut self, new_pos: usize) {
        self.cursor_pos = new_pos;
    }

    #[must_use]
    pub fn set_cursor_pos(&self, new_pos: usize) -> Self {
        let mut new_seed = self.clone();
        new_seed.set_cursor_pos_inplace(new_pos);
        new_seed
    }

    pub fn set_cursor_dir_inplace(&mut self, dir: Direction) {
        self.cursor_dir = dir;
    }

    #[must_use]
    pub fn set_cursor_dir(&self, dir: Direction) -> Self {
        let mut new_seed = self.clone();
        new_seed.set_cursor_dir_inplace(dir);
        new_seed
    }

    /// Moves the cursor one step in `cursor_dir`. Returns `false` (and
    /// leaves the cursor untouched) if that would fall off either end.
    pub fn step_cursor_inplace(&mut self) -> bool {
        match self.cursor_dir {
            Direction::Left if self.cursor_pos != 0 => {
                self.set_cursor_pos_inplace(self.cursor_pos - 1);
                true
            }
            Direction::Right if self.cursor_pos + 1 < self.byte_vals.len() => {
                self.set_cursor_pos_inplace(self.cursor_pos + 1);
                true
            }
            _ => false,
        }
    }

    /// Clone-and-mutate counterpart of [`Self::step_cursor_inplace`].
    #[must_use]
    pub fn step_cursor(&self) -> Option<Self> {
        let mut new_seed = self.clone();
        new_seed.step_cursor_inplace().then_some(new_seed)
    }

    fn find_unfixed_byte(bytes: &[ByteVal], cur_index: usize) -> Option<usize> {
        let start = cur_index.min(bytes.len());
        bytes[start..].iter().position(ByteVal::is_unfixed).map(|i| start + i)
    }

    fn find_unfixed_byte_backward(bytes: &[ByteVal], cur_index: usize) -> Option<usize> {
        let end = cur_index.min(bytes.len().saturating_sub(1));
        bytes[..=end].iter().rposition(ByteVal::is_unfixed)
    }

    /// From the cursor, scans in `cursor_dir` for the nearest unfixed byte
    /// (inclusive of the current position) and moves the cursor there.
    /// Returns `false` if none is found; `Direction::Stay` always fails.
    pub fn move_to_unfixed_byte_inplace(&mut self) -> bool {
        match self.cursor_dir {
            Direction::Left => match Self::find_unfixed_byte_backward(&self.byte_vals, self.cursor_pos) {
                Some(offset) => {
                    self.set_cursor_pos_inplace(offset);
                    true
                }
                None => false,
            },
            Direction::Right => match Self::find_unfixed_byte(&self.byte_vals, self.cursor_pos) {
                Some(offset) => {
                    self.set_cursor_pos_inplace(offset);
                    true
                }
                None => false,
            },
            Direction::Stay => false,
        }
    }

    /// Clone-and-mutate counterpart of [`Self::move_to_unfixed_byte_inplace`].
    #[must_use]
    pub fn move_to_unfixed_byte(&self) -> Option<Self> {
        let mut new_seed = self.clone();
        new_seed.move_to_unfixed_byte_inplace().then_some(new_seed)
    }

    /// [`Self::step_cursor_inplace`] followed by
    /// [`Self::move_to_unfixed_byte_inplace`]; fails if either step does.
    pub fn proceed_cursor_inplace(&mut self) -> bool {
        self.step_cursor_inplace() && self.move_to_unfixed_byte_inplace()
    }

    /// Clone-and-mutate counterpart of [`Self::proceed_cursor_inplace`].
    #[must_use]
    pub fn proceed_cursor(&self) -> Option<Self> {
        let mut new_seed = self.clone();
        new_seed.proceed_cursor_inplace().then_some(new_seed)
    }

    /// Produces up to two derived seeds: the cursor pinned `Left` and
    /// `Right` of its current position, each advanced to the nearest
    /// unfixed byte in that direction. A seed currently sitting on a
    /// `Sampled` byte skips the `Left` candidate that would re-sample the
    /// same offset by stepping left once more before the unfixed-byte scan.
    #[must_use]
    pub fn relocate_cursor(&self) -> Vec<Self> {
        let cur_byte_val = self.get_cur_byte_val();
        let mut candidates = Vec::with_capacity(2);

        let leftward = self.set_cursor_dir(Direction::Left);
        let leftward = if matches!(cur_byte_val, ByteVal::Sampled { .. }) {
            leftward.step_cursor()
        } else {
            Some(leftward)
        };
        if let Some(mut s) = leftward {
            if s.move_to_unfixed_byte_inplace() {
                candidates.push(s);
            }
        }

        let rightward = self.set_cursor_dir(Direction::Right).step_cursor();
        if let Some(mut s) = rightward {
            if s.move_to_unfixed_byte_inplace() {
                candidates.push(s);
            }
        }

        candidates
    }

    fn untouched_to_str(run: &[ByteVal]) -> String {
        if run.is_empty() {
            String::new()
        } else if run.len() < 4 {
            let mut s = String::from(" ");
            for (i, v) in run.iter().enumerate() {
                if i != 0 {
                    s.push(' ');
                }
                s.push_str(&v.to_tagged_string());
            }
            s
        } else {
            alloc::format!(" ...{}bytes...", run.len())
        }
    }

    /// Dense one-line textual form: each byte's tagged string, with runs of
    /// 4+ consecutive `Untouched` bytes collapsed to `...Nbytes...`, followed
    /// by `(cursor_pos) (cursor_dir)`.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        let mut accum_untouched: Vec<ByteVal> = Vec::new();
        let mut out = String::new();

        for v in &self.byte_vals {
            if matches!(v, ByteVal::Untouched { .. }) {
                accum_untouched.push(*v);
            } else {
                out.push_str(&Self::untouched_to_str(&accum_untouched));
                accum_untouched.clear();
                out.push(' ');
                out.push_str(&v.to_tagged_string());
            }
        }
        out.push_str(&Self::untouched_to_str(&accum_untouched));

        alloc::format!(
            "{out} ({}) ({})",
            self.cursor_pos,
            match self.cursor_dir {
                Direction::Left => "Left",
                Direction::Right => "Right",
                Direction::Stay => "Stay",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdin_seed(bytes: &[u8]) -> Seed {
        Seed::with_bytes(InputSource::StdInput, bytes).unwrap()
    }

    #[test]
    fn construction_rejects_empty_bytes() {
        assert!(Seed::with_bytes(InputSource::StdInput, &[]).is_err());
    }

    #[test]
    fn new_seed_is_filled_and_untouched() {
        let seed = Seed::new(InputSource::StdInput);
        assert_eq!(seed.get_cur_length(), INIT_INPUT_LEN);
        assert!(seed.byte_vals().iter().all(|v| matches!(v, ByteVal::Untouched { v: b'A' })));
    }

    #[test]
    fn concretize_round_trips_plain_bytes() {
        let seed = stdin_seed(b"hello");
        assert_eq!(seed.concretize(), b"hello".to_vec());
    }

    #[test]
    fn query_len_toward_rejects_stay() {
        let seed = stdin_seed(b"abc");
        assert!(seed.query_len_toward(Direction::Stay).is_err());
    }

    #[test]
    fn query_len_toward_counts_inclusive_of_cursor() {
        let mut seed = stdin_seed(b"abcde");
        seed.set_cursor_pos_inplace(2);
        assert_eq!(seed.query_len_toward(Direction::Right).unwrap(), 3);
        assert_eq!(seed.query_len_toward(Direction::Left).unwrap(), 3);
    }

    #[test]
    fn fix_cur_bytes_extends_with_undecided_padding() {
        let mut seed = stdin_seed(b"ab");
        seed.set_cursor_pos_inplace(1);
        seed.fix_cur_bytes_inplace(Direction::Right, &[b'X', b'Y', b'Z']).unwrap();
        assert_eq!(seed.get_cur_length(), 4);
        assert_eq!(seed.byte_vals()[1], ByteVal::Fixed { v: b'X' });
        assert_eq!(seed.byte_vals()[3], ByteVal::Fixed { v: b'Z' });
    }

    #[test]
    fn fix_cur_bytes_left_rejects_underflow() {
        let mut seed = stdin_seed(b"ab");
        seed.set_cursor_pos_inplace(0);
        assert!(seed.fix_cur_bytes_inplace(Direction::Left, &[1, 2, 3]).is_err());
    }

    #[test]
    fn step_cursor_stops_at_bounds() {
        let mut seed = stdin_seed(b"ab");
        seed.set_cursor_dir_inplace(Direction::Left);
        assert!(!seed.step_cursor_inplace());
        seed.set_cursor_pos_inplace(1);
        seed.set_cursor_dir_inplace(Direction::Right);
        assert!(!seed.step_cursor_inplace());
    }

    #[test]
    fn move_to_unfixed_byte_skips_fixed_run() {
        let mut seed = stdin_seed(b"abcdef");
        seed.constrain_byte_at_inplace(Direction::Right, 1, b'X', b'X').unwrap();
        seed.constrain_byte_at_inplace(Direction::Right, 2, b'X', b'X').unwrap();
        seed.set_cursor_pos_inplace(0);
        seed.set_cursor_dir_inplace(Direction::Right);
        assert!(seed.move_to_unfixed_byte_inplace());
        // byte 0 is itself unfixed, so the cursor should not move at all.
        assert_eq!(seed.cursor_pos(), 0);
    }

    #[test]
    fn relocate_cursor_yields_both_directions_in_the_middle() {
        let mut seed = stdin_seed(b"abcde");
        seed.set_cursor_pos_inplace(2);
        let relocated = seed.relocate_cursor();
        assert_eq!(relocated.len(), 2);
    }

    #[test]
    fn json_round_trip_preserves_cursor_and_bytes() {
        let mut seed = stdin_seed(b"abc");
        seed.set_cursor_pos_inplace(1);
        seed.set_cursor_dir_inplace(Direction::Left);
        let json = serde_json::to_string(&seed).unwrap();
        let back: Seed = serde_json::from_str(&json).unwrap();
        assert_eq!(seed, back);
    }

    #[test]
    fn to_display_string_collapses_long_untouched_runs() {
        let seed = Seed::new(InputSource::StdInput);
        let s = seed.to_display_string();
        assert!(s.contains("bytes..."));
    }
}
