// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The canonical outcome of a test case, and the rules that reinterpret an adapter's raw result
//! together with a termination status into one.
//!
//! Both adapters parse their own wire format into a [`RawResult`]; [`reinterpret`] then folds that
//! raw value with the [`Status`] (or its absence, on timeout) the executor observed. This keeps the
//! reinterpretation table in one place instead of duplicating it per adapter, per the "adapter
//! polymorphism" design note.

use crate::status::Status;
use std::fmt;

/// What an adapter's result file or output banner claimed, before reinterpretation against the
/// termination status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawResult {
    Passed,
    Skipped(String),
    Failed(String),
    ExpectedFailure(String),
    Broken(String),
    /// GoogleTest-only: a `YOU HAVE N DISABLED TEST(S)` banner. Reinterpreted like `Skipped`.
    Disabled(String),
}

/// The canonical result of a test case, after reinterpretation.
///
/// Only [`CanonicalResult::Passed`] lacks a reason; every other variant carries one, even if the
/// test program supplied an empty one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CanonicalResult {
    Passed,
    Failed(String),
    Skipped(String),
    Broken(String),
    ExpectedFailure(String),
}

impl CanonicalResult {
    /// True for `Passed`, `Skipped`, and `ExpectedFailure` — the outcomes a front-end should not
    /// treat as a run failure.
    pub fn good(&self) -> bool {
        matches!(self, Self::Passed | Self::Skipped(_) | Self::ExpectedFailure(_))
    }

    /// The store/report-facing type tag.
    pub fn result_type(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
            Self::Broken(_) => "broken",
            Self::ExpectedFailure(_) => "expected_failure",
        }
    }

    /// The reason string, or `None` for `Passed`.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Failed(r) | Self::Skipped(r) | Self::Broken(r) | Self::ExpectedFailure(r) => {
                Some(r)
            }
        }
    }
}

impl fmt::Display for CanonicalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {reason}", self.result_type()),
            None => write!(f, "{}", self.result_type()),
        }
    }
}

/// Folds a parsed `raw` result with the termination `status` the executor observed (`None` means
/// the deadline killer fired) into a [`CanonicalResult`], per the reinterpretation table in §4.7 of
/// the design. `raw` is `None` when the result file couldn't be read at all.
pub fn reinterpret(raw: Option<&RawResult>, status: Option<Status>) -> CanonicalResult {
    let Some(status) = status else {
        // The table only documents this combination for a missing result file, but a deadline
        // killer firing always means we stop trusting whatever the child might have written.
        return CanonicalResult::Broken("Test case body timed out".to_owned());
    };

    let Some(raw) = raw else {
        return CanonicalResult::Broken(format!("Error: Premature exit. Test case {status}"));
    };

    match raw {
        RawResult::Passed => {
            if status.success() {
                CanonicalResult::Passed
            } else {
                CanonicalResult::Broken(format!(
                    "Passed test case should have reported success but {status}"
                ))
            }
        }
        RawResult::Failed(reason) => {
            if !status.success() {
                CanonicalResult::Failed(reason.clone())
            } else {
                CanonicalResult::Broken(
                    "Failed test case should have reported failure but exited with success"
                        .to_owned(),
                )
            }
        }
        RawResult::Skipped(reason) | RawResult::Disabled(reason) => {
            if status.success() {
                CanonicalResult::Skipped(reason.clone())
            } else {
                CanonicalResult::Broken(format!(
                    "Skipped test case should have reported success but {status}"
                ))
            }
        }
        RawResult::ExpectedFailure(reason) => {
            if status.success() {
                CanonicalResult::ExpectedFailure(reason.clone())
            } else {
                CanonicalResult::Broken(format!(
                    "Expected-failure test case should have reported success but {status}"
                ))
            }
        }
        RawResult::Broken(reason) => CanonicalResult::Broken(reason.clone()),
    }
}

/// Folds a test case's body result with its cleanup-phase status, per the open-question
/// resolution in DESIGN.md: cleanup failure downgrades a passed body to broken; otherwise the body
/// result wins regardless of what the cleanup phase did.
pub fn fold_cleanup(body: CanonicalResult, cleanup_status: Option<Status>) -> CanonicalResult {
    let cleanup_ok = matches!(cleanup_status, Some(status) if status.success());
    match body {
        CanonicalResult::Passed if !cleanup_ok => {
            let detail = match cleanup_status {
                Some(status) => format!("cleanup {status}"),
                None => "cleanup timed out".to_owned(),
            };
            CanonicalResult::Broken(format!("Test case cleanup did not succeed: {detail}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn passed_with_exit_zero_is_passed() {
        let status = Status::Exited { pid: 1, code: 0 };
        assert_eq!(reinterpret(Some(&RawResult::Passed), Some(status)), CanonicalResult::Passed);
    }

    #[test]
    fn passed_with_nonzero_exit_is_broken() {
        let status = Status::Exited { pid: 1, code: 1 };
        assert!(matches!(
            reinterpret(Some(&RawResult::Passed), Some(status)),
            CanonicalResult::Broken(_)
        ));
    }

    #[test_case(0, false ; "exit zero is broken")]
    #[test_case(1, true ; "nonzero exit keeps failed")]
    fn failed_requires_nonzero_exit(code: i32, expect_failed: bool) {
        let status = Status::Exited { pid: 1, code };
        let result = reinterpret(Some(&RawResult::Failed("boom".into())), Some(status));
        assert_eq!(matches!(result, CanonicalResult::Failed(_)), expect_failed);
    }

    #[test]
    fn disabled_is_treated_like_skipped() {
        let status = Status::Exited { pid: 1, code: 0 };
        let result = reinterpret(Some(&RawResult::Disabled("YOU HAVE 1 DISABLED TEST".into())), Some(status));
        assert_eq!(result, CanonicalResult::Skipped("YOU HAVE 1 DISABLED TEST".into()));
    }

    #[test]
    fn missing_result_file_with_signal_reports_premature_exit() {
        let status = Status::Signaled { pid: 1, signo: 11, coredump: true };
        let result = reinterpret(None, Some(status));
        assert_eq!(
            result,
            CanonicalResult::Broken(
                "Error: Premature exit. Test case received signal 11 (core dumped)".to_owned()
            )
        );
    }

    #[test]
    fn timeout_reports_body_timed_out() {
        assert_eq!(
            reinterpret(Some(&RawResult::Passed), None),
            CanonicalResult::Broken("Test case body timed out".to_owned())
        );
    }

    #[test]
    fn good_predicate_matches_spec_table() {
        assert!(CanonicalResult::Passed.good());
        assert!(CanonicalResult::Skipped("x".into()).good());
        assert!(CanonicalResult::ExpectedFailure("x".into()).good());
        assert!(!CanonicalResult::Failed("x".into()).good());
        assert!(!CanonicalResult::Broken("x".into()).good());
    }

    #[test]
    fn cleanup_downgrades_passed_on_failure() {
        let cleanup_status = Status::Exited { pid: 2, code: 1 };
        let result = fold_cleanup(CanonicalResult::Passed, Some(cleanup_status));
        assert!(matches!(result, CanonicalResult::Broken(_)));
    }

    #[test]
    fn cleanup_does_not_affect_non_passed_body() {
        let cleanup_status = Status::Exited { pid: 2, code: 1 };
        let result = fold_cleanup(CanonicalResult::Failed("x".into()), Some(cleanup_status));
        assert_eq!(result, CanonicalResult::Failed("x".into()));
    }

    #[test]
    fn cleanup_success_leaves_passed_alone() {
        let cleanup_status = Status::Exited { pid: 2, code: 0 };
        let result = fold_cleanup(CanonicalResult::Passed, Some(cleanup_status));
        assert_eq!(result, CanonicalResult::Passed);
    }
}
