// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution core for external test programs.
//!
//! A *test program* is an arbitrary binary that, given an interface-specific protocol, can
//! enumerate and run individual test cases. This crate discovers those cases, runs each one as an
//! isolated child process under a deadline, reinterprets its termination status together with a
//! structured result artifact into a [`result::CanonicalResult`], and unwinds cleanly on
//! SIGHUP/SIGINT/SIGTERM.
//!
//! The command-line front-end, the persistent store, and the manifest loader that enumerates test
//! programs are all external collaborators: this crate only exposes the `Scheduler` and the
//! [`sink::ResultSink`] trait a caller implements to receive results.

pub mod adapters;
pub mod deadline;
pub mod errors;
pub mod executor;
pub mod filter;
pub mod interrupt;
pub mod isolate;
pub mod metadata;
pub mod program;
pub mod result;
pub mod scheduler;
pub mod sink;
pub mod status;
pub mod time;
