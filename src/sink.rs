// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The boundary between this crate and the (external) persistent store.
//!
//! This crate never opens a database connection or holds one across a `wait`; it just calls
//! [`ResultSink::record`] once per case with everything a store needs to persist a row.

use crate::program::{TestCaseId, TestProgramRef};
use crate::result::CanonicalResult;
use camino::Utf8PathBuf;
use std::time::SystemTime;

/// Everything the scheduler knows about a finished case, handed to a [`ResultSink`].
#[derive(Clone, Debug)]
pub struct CaseOutcome {
    pub result: CanonicalResult,
    pub start: SystemTime,
    pub end: SystemTime,
    pub stdout_file: Utf8PathBuf,
    pub stderr_file: Utf8PathBuf,
}

/// Implemented by the external persistent store. The `Scheduler` calls `record` exactly once per
/// case it executes (including cases skipped before running and synthetic broken results).
pub trait ResultSink {
    fn record(&mut self, program: &TestProgramRef, case: &TestCaseId, outcome: &CaseOutcome);
}

/// A [`ResultSink`] that collects outcomes in memory, useful for tests and small front-ends that
/// don't need a real store.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Vec<(TestProgramRef, TestCaseId, CaseOutcome)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[(TestProgramRef, TestCaseId, CaseOutcome)] {
        &self.records
    }
}

impl ResultSink for RecordingSink {
    fn record(&mut self, program: &TestProgramRef, case: &TestCaseId, outcome: &CaseOutcome) {
        self.records.push((program.clone(), case.clone(), outcome.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::InterfaceTag;

    #[test]
    fn recording_sink_collects_in_order() {
        let mut sink = RecordingSink::new();
        let program = TestProgramRef::new("/root", "prog", "suite", InterfaceTag::Atf);
        let case_a = TestCaseId::new("prog", "a");
        let case_b = TestCaseId::new("prog", "b");
        let outcome = CaseOutcome {
            result: CanonicalResult::Passed,
            start: SystemTime::now(),
            end: SystemTime::now(),
            stdout_file: Utf8PathBuf::from("/tmp/stdout"),
            stderr_file: Utf8PathBuf::from("/tmp/stderr"),
        };
        sink.record(&program, &case_a, &outcome);
        sink.record(&program, &case_b, &outcome);
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.records()[0].1, case_a);
        assert_eq!(sink.records()[1].1, case_b);
    }
}
