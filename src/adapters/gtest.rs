// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The GoogleTest adapter: `--gtest_list_tests` output and the `[ RUN ]`/`[ OK ]`/`[ FAILED ]`/
//! `[ SKIPPED ]` banner lines a GoogleTest binary writes to stdout while running.

use super::{Listing, LIST_TIMEOUT, SYNTHETIC_LIST_CASE};
use crate::errors::{CoreError, FormatError};
use crate::executor::{Executor, ExitHandle};
use crate::metadata::Metadata;
use crate::program::{TestCaseId, TestProgramRef};
use crate::result::{self, CanonicalResult, RawResult};
use std::sync::LazyLock;

static SUITE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_/]*)\.(\s+# TypeParam = .+)?$").unwrap());
static CASE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^  ([A-Za-z0-9_][A-Za-z0-9_/]*)(\s+# GetParam\(\) = .+)?$").unwrap());
static DISABLED_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"YOU HAVE \d+ DISABLED TEST").unwrap());

pub async fn list(executor: &Executor, program: &TestProgramRef) -> Result<Listing, CoreError> {
    let synthetic = |message: String| {
        Listing::Broken(TestCaseId::new(program.binary_path(), SYNTHETIC_LIST_CASE), message)
    };

    let control_dir = executor.spawn_pre()?;
    let spawn_result = executor
        .spawn(
            &control_dir,
            &program.absolute_path(),
            &["--gtest_color=no".to_owned(), "--gtest_list_tests".to_owned()],
            &[],
            LIST_TIMEOUT,
            None,
        )
        .await;

    let handle = match spawn_result {
        Ok(handle) => handle,
        Err(CoreError::Spawn(crate::errors::SpawnError::Spawn { source, .. })) => {
            let diagnostic = match source.kind() {
                std::io::ErrorKind::NotFound => "test program does not exist".to_owned(),
                std::io::ErrorKind::PermissionDenied => "test program is not executable".to_owned(),
                _ => format!("failed to execute test program: {source}"),
            };
            return Ok(synthetic(diagnostic));
        }
        Err(error) => return Err(error),
    };

    let mut exit = executor.wait(handle).await?;
    if exit.status().is_none() {
        exit.cleanup();
        return Ok(synthetic("Test program timed out while listing its test cases".to_owned()));
    }

    let content = std::fs::read_to_string(exit.stdout_file());
    exit.cleanup();
    let content = match content {
        Ok(content) => content,
        Err(error) => return Ok(synthetic(format!("failed to read listing output: {error}"))),
    };

    match parse_list(&content, program) {
        Ok(names) => {
            let cases = names
                .into_iter()
                .map(|name| (TestCaseId::new(program.binary_path(), name), Metadata::default()))
                .collect();
            Ok(Listing::Cases(cases))
        }
        Err(error) => Ok(synthetic(error.to_string())),
    }
}

fn parse_list(content: &str, _program: &TestProgramRef) -> Result<Vec<String>, FormatError> {
    let mut names = Vec::new();
    let mut current_suite: Option<String> = None;

    for line in content.lines() {
        if let Some(captures) = SUITE_RE.captures(line) {
            current_suite = Some(captures[1].to_owned());
        } else if let Some(captures) = CASE_RE.captures(line) {
            let Some(suite) = &current_suite else {
                return Err(FormatError::new(format!("test case line `{line}` outside of any suite")));
            };
            names.push(format!("{suite}.{}", &captures[1]));
        }
        // Lines matching neither pattern are tolerated (diagnostic output).
    }

    if names.is_empty() {
        return Err(FormatError::new("GoogleTest listing produced no test cases"));
    }

    Ok(names)
}

pub async fn run_case(
    executor: &Executor,
    program: &TestProgramRef,
    case: &TestCaseId,
    metadata: &Metadata,
) -> Result<(CanonicalResult, ExitHandle), CoreError> {
    let control_dir = executor.spawn_pre()?;
    let args = vec!["--gtest_color=no".to_owned(), format!("--gtest_filter={}", case.name)];
    let extra_env: Vec<(String, String)> = metadata
        .custom()
        .iter()
        .map(|(key, value)| (format!("TEST_ENV_{key}"), value.clone()))
        .collect();

    let handle = executor
        .spawn(&control_dir, &program.absolute_path(), &args, &extra_env, metadata.timeout(), None)
        .await?;
    let exit = executor.wait(handle).await?;

    let content = std::fs::read_to_string(exit.stdout_file()).unwrap_or_default();
    let raw = parse_banner(&content, &case.name);
    let canonical = canonical_for(raw, exit.status());
    Ok((canonical, exit))
}

/// Folds a parsed banner (or its absence) with the termination status, per §4.8. Separate from
/// [`crate::result::reinterpret`] because GoogleTest's no-valid-block case has its own wording
/// (`"invalid output"` on a clean exit, a premature-exit message otherwise) rather than ATF's
/// missing-result-file text.
fn canonical_for(raw: Option<RawResult>, status: Option<crate::status::Status>) -> CanonicalResult {
    match raw {
        Some(raw) => result::reinterpret(Some(&raw), status),
        None => match status {
            None => result::reinterpret(None, None),
            Some(status) if status.success() => CanonicalResult::Broken("invalid output".to_owned()),
            Some(status) => CanonicalResult::Broken(format!("Premature exit. Test case {status}")),
        },
    }
}

/// Scans stdout for the `[ RUN ]`/`[ OK ]`/`[ FAILED ]`/`[ SKIPPED ]` banner for `case_name`, or
/// for a `YOU HAVE N DISABLED TEST(S)` line. Returns `None` if no valid block was found at all: the
/// caller reports `Broken("invalid output")` on a clean exit, or folds in the termination status
/// for an abnormal one, per §4.8.
fn parse_banner(content: &str, case_name: &str) -> Option<RawResult> {
    if let Some(line) = content.lines().find(|line| DISABLED_RE.is_match(line)) {
        return Some(RawResult::Disabled(line.trim().to_owned()));
    }

    let run_marker = format!("[ RUN      ] {case_name}");
    let start = content.find(&run_marker)?;
    let after_run = &content[start + run_marker.len()..];

    const END_MARKERS: [(&str, fn(String) -> RawResult); 3] = [
        ("[       OK ]", |_| RawResult::Passed),
        ("[  FAILED  ]", RawResult::Failed),
        ("[  SKIPPED ]", RawResult::Skipped),
    ];

    let mut best: Option<(usize, usize, fn(String) -> RawResult)> = None;
    for (marker, build) in END_MARKERS {
        if let Some(pos) = after_run.find(marker) {
            if best.is_none_or(|(best_pos, ..)| pos < best_pos) {
                best = Some((pos, marker.len(), build));
            }
        }
    }

    let (pos, marker_len, build) = best?;
    let context = after_run[..pos].trim().to_owned();
    let context = if context.is_empty() { "\n".to_owned() } else { context };
    let _ = marker_len;
    Some(build(context))
}
