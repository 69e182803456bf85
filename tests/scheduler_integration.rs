// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end coverage of the wiring between `Scheduler`, `Executor`, and the adapters, using real
//! shell-script "test programs" rather than mocks.

use bytesize::ByteSize;
use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use casecore::filter::FilterSet;
use casecore::interrupt::InterruptController;
use casecore::program::{InterfaceTag, TestProgramRef};
use casecore::result::CanonicalResult;
use casecore::scheduler::{RuntimeContext, RuntimeUser, Scheduler};
use casecore::sink::RecordingSink;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn write_script(dir: &Utf8TempDir, name: &str, body: &str) -> Utf8PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    Utf8PathBuf::from(name)
}

fn base_context() -> RuntimeContext {
    RuntimeContext {
        architecture: "x86_64".to_owned(),
        platform: "linux".to_owned(),
        user: RuntimeUser::Root,
        available_programs: HashSet::new(),
        defined_configs: HashSet::new(),
        available_memory: ByteSize::gb(1),
    }
}

const ATF_SCRIPT: &str = r#"#!/bin/sh
set -e
if [ "$1" = "-l" ]; then
    printf 'Content-Type: application/X-atf-tp; version="1"\n\nident: case1\n'
    exit 0
fi
case_name="$1"
shift
result_file=""
while [ $# -gt 0 ]; do
    case "$1" in
        -r) result_file="$2"; shift 2 ;;
        -s) shift 2 ;;
        -v) shift 2 ;;
        *) shift ;;
    esac
done
echo "passed" > "$result_file"
exit 0
"#;

const GTEST_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "--gtest_list_tests" ] || [ "$2" = "--gtest_list_tests" ]; then
    printf 'Suite.\n  Case\n'
    exit 0
fi
printf '[ RUN      ] Suite.Case\n[       OK ] Suite.Case (0 ms)\n'
exit 0
"#;

#[tokio::test]
async fn atf_program_runs_and_passes() {
    init_logging();
    let dir = Utf8TempDir::new().unwrap();
    let binary_path = write_script(&dir, "atf_prog", ATF_SCRIPT);
    let program = TestProgramRef::new(dir.path(), binary_path, "suite", InterfaceTag::Atf);

    let interrupt = InterruptController::setup().unwrap();
    let scheduler = Scheduler::new(interrupt).unwrap();
    let filter = FilterSet::new(Vec::<&str>::new()).unwrap();
    let context = base_context();
    let mut sink = RecordingSink::new();

    let outcome = scheduler.run([program], &filter, &context, &mut sink).await.unwrap();

    assert_eq!(outcome.passed, 1);
    assert!(outcome.is_success());
    assert_eq!(sink.records().len(), 1);
    assert_eq!(sink.records()[0].2.result, CanonicalResult::Passed);
}

#[tokio::test]
async fn gtest_program_runs_and_passes() {
    init_logging();
    let dir = Utf8TempDir::new().unwrap();
    let binary_path = write_script(&dir, "gtest_prog", GTEST_SCRIPT);
    let program = TestProgramRef::new(dir.path(), binary_path, "suite", InterfaceTag::GoogleTest);

    let interrupt = InterruptController::setup().unwrap();
    let scheduler = Scheduler::new(interrupt).unwrap();
    let filter = FilterSet::new(Vec::<&str>::new()).unwrap();
    let context = base_context();
    let mut sink = RecordingSink::new();

    let outcome = scheduler.run([program], &filter, &context, &mut sink).await.unwrap();

    assert_eq!(outcome.passed, 1);
    assert_eq!(sink.records()[0].2.result, CanonicalResult::Passed);
}

#[tokio::test]
async fn unmatched_filter_fails_the_run_even_when_everything_passes() {
    init_logging();
    let dir = Utf8TempDir::new().unwrap();
    let binary_path = write_script(&dir, "atf_prog", ATF_SCRIPT);
    let program = TestProgramRef::new(dir.path(), binary_path, "suite", InterfaceTag::Atf);

    let interrupt = InterruptController::setup().unwrap();
    let scheduler = Scheduler::new(interrupt).unwrap();
    let filter = FilterSet::new(["atf_prog", "never_matches"]).unwrap();
    let context = base_context();
    let mut sink = RecordingSink::new();

    let outcome = scheduler.run([program], &filter, &context, &mut sink).await.unwrap();

    assert_eq!(outcome.passed, 1);
    assert!(!outcome.is_success());
    assert_eq!(outcome.unused_filters, vec!["never_matches".to_owned()]);
}

#[tokio::test]
async fn missing_required_config_skips_without_running() {
    init_logging();
    let dir = Utf8TempDir::new().unwrap();
    let script = ATF_SCRIPT.replace(
        "ident: case1\n",
        "ident: case1\nrequire.config: feature_x\n",
    );
    let binary_path = write_script(&dir, "atf_prog", &script);
    let program = TestProgramRef::new(dir.path(), binary_path, "suite", InterfaceTag::Atf);

    let interrupt = InterruptController::setup().unwrap();
    let scheduler = Scheduler::new(interrupt).unwrap();
    let filter = FilterSet::new(Vec::<&str>::new()).unwrap();
    let context = base_context();
    let mut sink = RecordingSink::new();

    let outcome = scheduler.run([program], &filter, &context, &mut sink).await.unwrap();

    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.passed, 0);
    assert!(matches!(sink.records()[0].2.result, CanonicalResult::Skipped(_)));
}
