// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestrates a run: list-then-run per program, metadata-based skip evaluation against the
//! runtime environment, and result routing to a [`ResultSink`].
//!
//! This is the only entry point a front-end needs: it owns the [`Executor`] internally and drives
//! it through every program in the manifest, leaving enumeration of those programs and storage of
//! the results to external collaborators.

use crate::adapters::{self, Listing};
use crate::errors::CoreError;
use crate::executor::{ExitHandle, Executor};
use crate::filter::FilterSet;
use crate::interrupt::InterruptController;
use crate::metadata::{Metadata, RequiredUser};
use crate::program::{TestCaseId, TestProgramRef};
use crate::result::CanonicalResult;
use crate::sink::{CaseOutcome, ResultSink};

use bytesize::ByteSize;
use camino::Utf8PathBuf;
use std::collections::HashSet;

/// Which of root or an unprivileged account the scheduler itself is running as. Distinct from
/// [`crate::isolate::UnprivilegedUser`], which names the account a *child* drops into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuntimeUser {
    Root,
    Unprivileged,
}

/// Facts about the host a front-end gathers once per run, supplied so the scheduler can decide
/// whether a case's requirements are satisfiable before spending a child process on it.
#[derive(Clone, Debug)]
pub struct RuntimeContext {
    pub architecture: String,
    pub platform: String,
    pub user: RuntimeUser,
    pub available_programs: HashSet<Utf8PathBuf>,
    pub defined_configs: HashSet<String>,
    pub available_memory: ByteSize,
}

/// Folded summary of a completed run, modeled on the runner teacher's `RunStats`: several distinct
/// failure conditions collapse into one boolean so a front-end can pick its exit code without
/// re-deriving the rule itself.
#[derive(Clone, Debug, Default)]
pub struct RunOutcome {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub expected_failure: usize,
    pub broken: usize,
    /// Filter strings (per [`FilterSet::unused`]) that never matched a program or case.
    pub unused_filters: Vec<String>,
}

impl RunOutcome {
    fn record(&mut self, result: &CanonicalResult) {
        match result {
            CanonicalResult::Passed => self.passed += 1,
            CanonicalResult::Failed(_) => self.failed += 1,
            CanonicalResult::Skipped(_) => self.skipped += 1,
            CanonicalResult::ExpectedFailure(_) => self.expected_failure += 1,
            CanonicalResult::Broken(_) => self.broken += 1,
        }
    }

    /// False if any case failed or came back broken, or if any user-supplied filter matched
    /// nothing — an all-green run with a stale filter is still a run the caller got wrong.
    pub fn is_success(&self) -> bool {
        if self.failed > 0 || self.broken > 0 {
            return false;
        }
        if !self.unused_filters.is_empty() {
            return false;
        }
        true
    }
}

/// Drives a run end to end. Owns the [`Executor`] (and, through it, the scratch-directory tree and
/// the signal-driven interrupt machinery).
pub struct Scheduler {
    executor: Executor,
}

impl Scheduler {
    pub fn new(interrupt: InterruptController) -> Result<Self, CoreError> {
        Ok(Self {
            executor: Executor::new(interrupt)?,
        })
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Runs every program in `programs` against `context`, filtering with `filter` and routing
    /// every case's result (including synthetic broken listings and skipped-before-run cases) to
    /// `sink`. Returns once every program has been listed and every admitted case has finished.
    ///
    /// # Errors
    /// Propagates a fatal [`CoreError`] — scratch-directory setup failure or a delivered interrupt
    /// — which aborts the run; partial results already handed to `sink` are not rolled back. On
    /// `Err(CoreError::Interrupted(_))` the caller should call
    /// [`InterruptController::redeliver_to_exit`] so the process terminates with the conventional
    /// signal exit status.
    pub async fn run(
        &self,
        programs: impl IntoIterator<Item = TestProgramRef>,
        filter: &FilterSet,
        context: &RuntimeContext,
        sink: &mut impl ResultSink,
    ) -> Result<RunOutcome, CoreError> {
        let mut outcome = RunOutcome::default();

        for program in programs {
            if !filter.matches_program(program.binary_path()) {
                continue;
            }

            self.executor.check_interrupt()?;
            match adapters::list(&self.executor, &program).await? {
                Listing::Broken(case, message) => {
                    let result = CanonicalResult::Broken(message);
                    outcome.record(&result);
                    record_synthetic(sink, &program, &case, result);
                }
                Listing::Cases(cases) => {
                    for (case, metadata) in cases {
                        if !filter.matches_case(&case.program, &case.name) {
                            continue;
                        }
                        self.run_one(&program, &case, &metadata, context, sink, &mut outcome)
                            .await?;
                    }
                }
            }
        }

        outcome.unused_filters = filter.unused();
        if !outcome.unused_filters.is_empty() {
            tracing::warn!(filters = ?outcome.unused_filters, "some test filters matched nothing");
        }

        Ok(outcome)
    }

    async fn run_one(
        &self,
        program: &TestProgramRef,
        case: &TestCaseId,
        metadata: &Metadata,
        context: &RuntimeContext,
        sink: &mut impl ResultSink,
        outcome: &mut RunOutcome,
    ) -> Result<(), CoreError> {
        if let Some(reason) = skip_reason(metadata, context) {
            let result = CanonicalResult::Skipped(reason);
            outcome.record(&result);
            record_synthetic(sink, program, case, result);
            return Ok(());
        }

        self.executor.check_interrupt()?;
        let (result, mut exit) = adapters::run_case(&self.executor, program, case, metadata).await?;
        outcome.record(&result);
        sink.record(program, case, &to_outcome(result, &exit));
        exit.cleanup();
        Ok(())
    }
}

/// Decides whether `metadata`'s requirements are satisfiable in `context`, per the skip-before-run
/// rules. Checks are ordered by how informative their reason is, not by cost.
fn skip_reason(metadata: &Metadata, context: &RuntimeContext) -> Option<String> {
    if metadata.required_user() == RequiredUser::Root && context.user == RuntimeUser::Unprivileged {
        return Some("requires root".to_owned());
    }
    if metadata.required_user() == RequiredUser::Unprivileged && context.user == RuntimeUser::Root {
        return Some("requires an unprivileged user".to_owned());
    }

    let architectures = metadata.allowed_architectures();
    if !architectures.is_empty() && !architectures.contains(&context.architecture) {
        return Some(format!("requires one of architectures {architectures:?}"));
    }
    let platforms = metadata.allowed_platforms();
    if !platforms.is_empty() && !platforms.contains(&context.platform) {
        return Some(format!("requires one of platforms {platforms:?}"));
    }

    for program in metadata.required_programs() {
        if !context.available_programs.contains(program) {
            return Some(format!("required program `{program}` is not available"));
        }
    }
    for file in metadata.required_files() {
        if !file.exists() {
            return Some(format!("required file `{file}` does not exist"));
        }
    }
    for config in metadata.required_configs() {
        if !context.defined_configs.contains(config) {
            return Some(format!("required config `{config}` is not defined"));
        }
    }

    if metadata.required_memory() > context.available_memory {
        return Some(format!(
            "requires {} of memory but only {} is available",
            metadata.required_memory(),
            context.available_memory
        ));
    }

    None
}

/// Records a case that never actually ran (excluded before any child was spawned), using the
/// current time for both endpoints and empty paths in place of captured output.
fn record_synthetic(
    sink: &mut impl ResultSink,
    program: &TestProgramRef,
    case: &TestCaseId,
    result: CanonicalResult,
) {
    let now = std::time::SystemTime::now();
    let outcome = CaseOutcome {
        result,
        start: now,
        end: now,
        stdout_file: Utf8PathBuf::new(),
        stderr_file: Utf8PathBuf::new(),
    };
    sink.record(program, case, &outcome);
}

fn to_outcome(result: CanonicalResult, exit: &ExitHandle) -> CaseOutcome {
    CaseOutcome {
        result,
        start: exit.start_time().wall(),
        end: exit.end_time().wall(),
        stdout_file: exit.stdout_file().to_owned(),
        stderr_file: exit.stderr_file().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn context() -> RuntimeContext {
        RuntimeContext {
            architecture: "x86_64".to_owned(),
            platform: "linux".to_owned(),
            user: RuntimeUser::Root,
            available_programs: HashSet::new(),
            defined_configs: HashSet::new(),
            available_memory: ByteSize::gb(1),
        }
    }

    #[test]
    fn root_required_skips_under_unprivileged_user() {
        let metadata = Metadata::from_properties([("required_user", "root")]).unwrap();
        let mut ctx = context();
        ctx.user = RuntimeUser::Unprivileged;
        assert_eq!(skip_reason(&metadata, &ctx), Some("requires root".to_owned()));
    }

    #[test]
    fn unprivileged_required_skips_under_root() {
        let metadata = Metadata::from_properties([("required_user", "unprivileged")]).unwrap();
        assert!(skip_reason(&metadata, &context()).is_some());
    }

    #[test]
    fn mismatched_architecture_is_skipped() {
        let metadata = Metadata::from_properties([("allowed_architectures", "arm64")]).unwrap();
        assert!(skip_reason(&metadata, &context()).is_some());
    }

    #[test]
    fn matching_architecture_runs() {
        let metadata = Metadata::from_properties([("allowed_architectures", "x86_64 arm64")]).unwrap();
        assert_eq!(skip_reason(&metadata, &context()), None);
    }

    #[test]
    fn missing_required_program_is_skipped() {
        let metadata = Metadata::from_properties([("required_programs", "missing-tool")]).unwrap();
        assert!(skip_reason(&metadata, &context()).is_some());
    }

    #[test]
    fn available_required_program_runs() {
        let metadata = Metadata::from_properties([("required_programs", "present-tool")]).unwrap();
        let mut ctx = context();
        ctx.available_programs.insert(Utf8PathBuf::from("present-tool"));
        assert_eq!(skip_reason(&metadata, &ctx), None);
    }

    #[test]
    fn undefined_required_config_is_skipped() {
        let metadata = Metadata::from_properties([("required_configs", "feature_x")]).unwrap();
        assert!(skip_reason(&metadata, &context()).is_some());
    }

    #[test]
    fn excess_required_memory_is_skipped() {
        let metadata = Metadata::from_properties([("required_memory", "10G")]).unwrap();
        assert!(skip_reason(&metadata, &context()).is_some());
    }

    #[test]
    fn default_metadata_never_skips() {
        let metadata = Metadata::default();
        assert_eq!(skip_reason(&metadata, &context()), None);
    }

    #[test]
    fn outcome_is_success_requires_no_unused_filters() {
        let mut outcome = RunOutcome::default();
        outcome.passed = 3;
        assert!(outcome.is_success());
        outcome.unused_filters.push("never/matched".to_owned());
        assert!(!outcome.is_success());
    }

    #[test]
    fn outcome_is_success_false_on_failure_or_broken() {
        let mut outcome = RunOutcome::default();
        outcome.failed = 1;
        assert!(!outcome.is_success());

        let mut outcome = RunOutcome::default();
        outcome.broken = 1;
        assert!(!outcome.is_success());
    }

    #[test]
    fn outcome_record_buckets_by_result_type() {
        let mut outcome = RunOutcome::default();
        outcome.record(&CanonicalResult::Passed);
        outcome.record(&CanonicalResult::Skipped("x".into()));
        outcome.record(&CanonicalResult::ExpectedFailure("x".into()));
        outcome.record(&CanonicalResult::Failed("x".into()));
        outcome.record(&CanonicalResult::Broken("x".into()));
        assert_eq!(outcome.passed, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.expected_failure, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.broken, 1);
    }
}
