//! Parses the per-run log files the instrumented tracer writes:
//! the newline-separated branch-trace JSON records and the two-line decimal
//! coverage summary.

use std::fs;
use std::path::Path;
use std::string::String;
use std::vec::Vec;

use serde::Deserialize;

use crate::bigint::BigInt;
use crate::branch::{BranchInfo, CompareType};
use crate::error::Error;

/// On-wire shape of one branch-trace record: `try_value` and
/// `distance` travel as decimal strings because a `BigInt` can exceed what a
/// native JSON number represents exactly.
#[derive(Deserialize)]
struct WireBranchInfo {
    inst_addr: u64,
    branch_type: CompareType,
    try_value: String,
    operand_size: u8,
    operand1: u64,
    operand2: u64,
    distance: String,
}

impl TryFrom<WireBranchInfo> for BranchInfo {
    type Error = Error;

    fn try_from(w: WireBranchInfo) -> Result<Self, Error> {
        Ok(BranchInfo {
            inst_addr: w.inst_addr,
            branch_type: w.branch_type,
            try_value: BigInt::from_str_radix10(&w.try_value)?,
            operand_size: w.operand_size,
            operand1: w.operand1,
            operand2: w.operand2,
            distance: BigInt::from_str_radix10(&w.distance)?,
        })
    }
}

/// Reads and parses a branch-trace log: one JSON object per non-empty line.
///
/// A malformed line is skipped rather than aborting the whole parse — one
/// corrupted record (e.g. a torn write from a timed-out target) shouldn't
/// throw away every branch the run did record cleanly; the run is simply
/// treated as having fewer usable branches.
///
/// # Errors
/// Returns an I/O error if `path` cannot be read at all (the run produced no
/// log file whatsoever, which is the caller's problem to classify, not this
/// function's to paper over).
pub fn parse_branch_trace(path: &Path) -> Result<Vec<BranchInfo>, Error> {
    let contents = fs::read_to_string(path)?;
    let mut out = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(wire) = serde_json::from_str::<WireBranchInfo>(line) else {
            continue;
        };
        if let Ok(info) = BranchInfo::try_from(wire) {
            out.push(info);
        }
    }
    Ok(out)
}

/// Reads the two-line `ECL_COVERAGE_LOG` file: `found_new_edge` then
/// `found_new_path`, each a decimal `0`/`1`.
///
/// # Errors
/// Returns [`Error::ParseFailure`] if the file has fewer than two lines or
/// either line fails to parse as an integer; an I/O error if it's missing.
pub fn parse_coverage_log(path: &Path) -> Result<(bool, bool), Error> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents.lines();
    let edge = lines
        .next()
        .ok_or_else(|| Error::parse_failure("coverage log missing found_new_edge line"))?;
    let path_line = lines
        .next()
        .ok_or_else(|| Error::parse_failure("coverage log missing found_new_path line"))?;
    let edge: i64 = edge
        .trim()
        .parse()
        .map_err(|_| Error::parse_failure("found_new_edge is not a decimal integer"))?;
    let path_flag: i64 = path_line
        .trim()
        .parse()
        .map_err(|_| Error::parse_failure("found_new_path is not a decimal integer"))?;
    Ok((edge != 0, path_flag != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tmp_file(name: &str, contents: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(std::format!("eclipser-parse-test-{name}-{:x}", std::process::id()));
        fs::write(&p, contents).unwrap();
        p
    }

    #[test]
    fn parses_well_formed_branch_trace() {
        let line = r#"{"inst_addr":4096,"branch_type":"Equality","try_value":"65","operand_size":1,"operand1":65,"operand2":65,"distance":"0"}"#;
        let p = tmp_file("branch-ok", &std::format!("{line}\n{line}\n"));
        let infos = parse_branch_trace(&p).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].try_value, BigInt::from(65u64));
        let _ = fs::remove_file(&p);
    }

    #[test]
    fn skips_malformed_lines_without_failing_the_whole_parse() {
        let good = r#"{"inst_addr":1,"branch_type":"Equality","try_value":"1","operand_size":1,"operand1":1,"operand2":1,"distance":"0"}"#;
        let p = tmp_file("branch-mixed", &std::format!("not json\n{good}\n"));
        let infos = parse_branch_trace(&p).unwrap();
        assert_eq!(infos.len(), 1);
        let _ = fs::remove_file(&p);
    }

    #[test]
    fn parses_coverage_log_flags() {
        let p = tmp_file("coverage-ok", "1\n0\n");
        let (edge, path) = parse_coverage_log(&p).unwrap();
        assert!(edge);
        assert!(!path);
        let _ = fs::remove_file(&p);
    }

    #[test]
    fn coverage_log_missing_second_line_is_parse_failure() {
        let p = tmp_file("coverage-short", "1\n");
        assert!(matches!(parse_coverage_log(&p), Err(Error::ParseFailure(..))));
        let _ = fs::remove_file(&p);
    }
}
