// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ATF test-interface adapter: a textual property header for listings, a single-line
//! `key=value` result file, and an optional separate cleanup-phase execution.

use super::{Listing, SYNTHETIC_LIST_CASE, LIST_TIMEOUT};
use crate::errors::{CoreError, FormatError};
use crate::executor::{Executor, ExitHandle};
use crate::metadata::Metadata;
use crate::program::{TestCaseId, TestProgramRef};
use crate::result::{self, CanonicalResult, RawResult};

const HEADER: &str = r#"Content-Type: application/X-atf-tp; version="1""#;

/// Maps ATF's historical abbreviated property names onto the canonical names
/// [`Metadata::from_properties`] recognizes. Any key not in this table (and not `X-`-prefixed) is
/// passed through unchanged, so a listing that already uses canonical names also works.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("descr", "description"),
    ("has.cleanup", "has_cleanup"),
    ("require.arch", "allowed_architectures"),
    ("require.machine", "allowed_platforms"),
    ("require.config", "required_configs"),
    ("require.files", "required_files"),
    ("require.progs", "required_programs"),
    ("require.memory", "required_memory"),
    ("require.user", "required_user"),
];

fn canonical_key(key: &str) -> &str {
    KEY_ALIASES
        .iter()
        .find_map(|(atf, canonical)| (*atf == key).then_some(*canonical))
        .unwrap_or(key)
}

pub async fn list(executor: &Executor, program: &TestProgramRef) -> Result<Listing, CoreError> {
    let synthetic = |message: String| {
        Listing::Broken(TestCaseId::new(program.binary_path(), SYNTHETIC_LIST_CASE), message)
    };

    let control_dir = executor.spawn_pre()?;
    let handle = executor
        .spawn(
            &control_dir,
            &program.absolute_path(),
            &["-l".to_owned()],
            &[],
            LIST_TIMEOUT,
            None,
        )
        .await?;
    let mut exit = executor.wait(handle).await?;

    if exit.status().is_none() {
        exit.cleanup();
        return Ok(synthetic("Test program timed out while listing its test cases".to_owned()));
    }
    if !exit.status().unwrap().success() {
        let status = exit.status().unwrap();
        exit.cleanup();
        return Ok(synthetic(format!("Test program failed to list its test cases: {status}")));
    }

    let content = std::fs::read_to_string(exit.stdout_file());
    exit.cleanup();
    let content = match content {
        Ok(content) => content,
        Err(error) => return Ok(synthetic(format!("failed to read listing output: {error}"))),
    };

    match parse_list(&content, program) {
        Ok(cases) => Ok(Listing::Cases(cases)),
        Err(error) => Ok(synthetic(error.to_string())),
    }
}

fn parse_list(
    content: &str,
    program: &TestProgramRef,
) -> Result<Vec<(TestCaseId, Metadata)>, FormatError> {
    let lines: Vec<&str> = content.lines().collect();
    let mut idx = 0;

    if lines.first() != Some(&HEADER) {
        return Err(FormatError::new("missing or invalid ATF Content-Type header"));
    }
    idx += 1;
    if lines.get(idx) != Some(&"") {
        return Err(FormatError::new("expected a blank line after the ATF header"));
    }
    idx += 1;

    let mut cases = Vec::new();
    while idx < lines.len() {
        let Some(name) = lines[idx].strip_prefix("ident: ") else {
            return Err(FormatError::new(format!("expected `ident: <name>`, got `{}`", lines[idx])));
        };
        if name.is_empty() {
            return Err(FormatError::new("empty test case name in ATF listing"));
        }
        idx += 1;

        let mut seen = std::collections::BTreeSet::new();
        let mut raw_props = Vec::new();
        while idx < lines.len() && !lines[idx].is_empty() {
            let Some((key, value)) = lines[idx].split_once(": ") else {
                return Err(FormatError::new(format!("malformed property line `{}`", lines[idx])));
            };
            if !seen.insert(key.to_owned()) {
                return Err(FormatError::new(format!("duplicate property `{key}` for case `{name}`")));
            }
            raw_props.push((canonical_key(key).to_owned(), value.to_owned()));
            idx += 1;
        }
        if idx < lines.len() {
            // Consume the blank line separating this entry from the next.
            idx += 1;
        }

        let props: Vec<(&str, &str)> =
            raw_props.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let metadata = Metadata::from_properties(props)
            .map_err(|e| FormatError::new(format!("invalid metadata for case `{name}`: {e}")))?;
        cases.push((TestCaseId::new(program.binary_path(), name), metadata));
    }

    if cases.is_empty() {
        return Err(FormatError::new("ATF listing has no test cases after the header"));
    }

    Ok(cases)
}

pub async fn run_case(
    executor: &Executor,
    program: &TestProgramRef,
    case: &TestCaseId,
    metadata: &Metadata,
) -> Result<(CanonicalResult, ExitHandle), CoreError> {
    let control_dir = executor.spawn_pre()?;
    let result_file = control_dir.join("result");
    let work_dir = control_dir.join("work");

    let mut args = vec![
        case.name.clone(),
        "-r".to_owned(),
        result_file.to_string(),
        "-s".to_owned(),
        work_dir.to_string(),
    ];
    for (key, value) in metadata.custom() {
        args.push("-v".to_owned());
        args.push(format!("{key}={value}"));
    }

    let handle = executor
        .spawn(&control_dir, &program.absolute_path(), &args, &[], metadata.timeout(), None)
        .await?;
    let body = executor.wait(handle).await?;

    let body_result = compute_result(&result_file, body.status());

    if !metadata.has_cleanup() {
        return Ok((body_result, body));
    }

    let cleanup_args = vec![
        case.name.clone(),
        "-s".to_owned(),
        work_dir.to_string(),
    ];
    let cleanup_handle = executor
        .spawn_followup(&body, &program.absolute_path(), &cleanup_args, &[], metadata.timeout())
        .await?;
    let mut cleanup = executor.wait(cleanup_handle).await?;
    let folded = result::fold_cleanup(body_result, cleanup.status());
    cleanup.cleanup();

    Ok((folded, body))
}

fn compute_result(
    result_file: &camino::Utf8Path,
    status: Option<crate::status::Status>,
) -> CanonicalResult {
    let raw = match std::fs::read_to_string(result_file) {
        Ok(content) => match parse_raw_result(content.lines().next().unwrap_or("")) {
            Ok(raw) => Some(raw),
            Err(error) => return CanonicalResult::Broken(format!("invalid result file: {error}")),
        },
        Err(_) => None,
    };
    result::reinterpret(raw.as_ref(), status)
}

fn parse_raw_result(line: &str) -> Result<RawResult, FormatError> {
    match line.split_once(": ") {
        None if line == "passed" => Ok(RawResult::Passed),
        None => Err(FormatError::new(format!("unrecognized result line `{line}`"))),
        Some(("passed", _)) => Err(FormatError::new("`passed` must not carry a reason")),
        Some(("skipped", reason)) => Ok(RawResult::Skipped(reason.to_owned())),
        Some(("failed", reason)) => Ok(RawResult::Failed(reason.to_owned())),
        Some(("expected_failure", reason)) => Ok(RawResult::ExpectedFailure(reason.to_owned())),
        Some(("broken", reason)) => Ok(RawResult::Broken(reason.to_owned())),
        Some((other, _)) => Err(FormatError::new(format!("unknown result status `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::InterfaceTag;

    fn program() -> TestProgramRef {
        TestProgramRef::new("/srv/tests", "suite/prog", "suite", InterfaceTag::Atf)
    }

    #[test]
    fn parses_single_entry_with_descr_alias() {
        let content = format!("{HEADER}\n\nident: abc\ndescr: hello\n");
        let cases = parse_list(&content, &program()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].0.name, "abc");
        assert_eq!(cases[0].1.description(), "hello");
        assert_eq!(cases[0].1.timeout(), std::time::Duration::from_secs(300));
    }

    #[test]
    fn parses_multiple_entries() {
        let content = format!("{HEADER}\n\nident: one\n\nident: two\ndescr: second\n");
        let cases = parse_list(&content, &program()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].0.name, "one");
        assert_eq!(cases[1].0.name, "two");
    }

    #[test]
    fn missing_header_is_format_error() {
        assert!(parse_list("ident: abc\n", &program()).is_err());
    }

    #[test]
    fn empty_listing_after_header_is_format_error() {
        let content = format!("{HEADER}\n\n");
        assert!(parse_list(&content, &program()).is_err());
    }

    #[test]
    fn duplicate_property_is_format_error() {
        let content = format!("{HEADER}\n\nident: abc\ndescr: a\ndescr: b\n");
        assert!(parse_list(&content, &program()).is_err());
    }

    #[test]
    fn unknown_property_is_format_error() {
        let content = format!("{HEADER}\n\nident: abc\nbogus: x\n");
        assert!(parse_list(&content, &program()).is_err());
    }

    #[test]
    fn result_file_passed() {
        assert_eq!(parse_raw_result("passed").unwrap(), RawResult::Passed);
    }

    #[test]
    fn result_file_passed_with_reason_is_rejected() {
        assert!(parse_raw_result("passed: oops").is_err());
    }

    #[test]
    fn result_file_skipped_requires_reason() {
        assert_eq!(
            parse_raw_result("skipped: no hardware").unwrap(),
            RawResult::Skipped("no hardware".to_owned())
        );
    }
}
