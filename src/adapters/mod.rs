// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test-interface adapters: ATF's textual property header and GoogleTest's stdout banners.
//!
//! Both adapters share the same capability set — list a program's cases, run one, and turn its
//! termination into a [`CanonicalResult`] — so they're dispatched through a tagged
//! [`crate::program::InterfaceTag`] rather than a trait object, per the "adapter polymorphism"
//! design note.

pub mod atf;
pub mod gtest;

use crate::errors::CoreError;
use crate::executor::{Executor, ExitHandle};
use crate::metadata::Metadata;
use crate::program::{InterfaceTag, TestCaseId, TestProgramRef};
use crate::result::CanonicalResult;

/// Default timeout applied to the listing exec itself (distinct from a case's own
/// `metadata.timeout`, which only applies once the case is actually run).
pub const LIST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// What `list` produced: either the program's advertised cases, or — if the program couldn't be
/// listed at all — a single synthetic case carrying a broken diagnostic, so the scheduler can
/// treat both outcomes uniformly.
pub enum Listing {
    Cases(Vec<(TestCaseId, Metadata)>),
    Broken(TestCaseId, String),
}

/// Lists `program`'s test cases.
pub async fn list(executor: &Executor, program: &TestProgramRef) -> Result<Listing, CoreError> {
    match program.interface() {
        InterfaceTag::Atf => atf::list(executor, program).await,
        InterfaceTag::GoogleTest => gtest::list(executor, program).await,
    }
}

/// Runs `case`'s body (and, for an ATF case with `has_cleanup`, its cleanup phase) and returns the
/// canonical result together with the body's [`ExitHandle`] (for its timestamps and captured
/// stdout/stderr). The caller owns the returned handle and must call `cleanup()` on it.
pub async fn run_case(
    executor: &Executor,
    program: &TestProgramRef,
    case: &TestCaseId,
    metadata: &Metadata,
) -> Result<(CanonicalResult, ExitHandle), CoreError> {
    match program.interface() {
        InterfaceTag::Atf => atf::run_case(executor, program, case, metadata).await,
        InterfaceTag::GoogleTest => gtest::run_case(executor, program, case, metadata).await,
    }
}

/// Name given to the synthetic case substituted for a program whose listing could not be parsed.
pub const SYNTHETIC_LIST_CASE: &str = "__test_cases_list__";
