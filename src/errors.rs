// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the execution core.
//!
//! Errors are split by failure domain rather than collapsed into one enum, mirroring the
//! recovery policy: a [`FormatError`] or [`SpawnError`] downgrades a single case to a broken
//! result and the run continues, while [`Interrupted`] and setup-time I/O errors propagate out of
//! [`crate::scheduler::Scheduler::run`].

use camino::Utf8PathBuf;
use thiserror::Error;

/// The adapter's input stream (a listing or a result file) violated its grammar.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct FormatError {
    message: String,
}

impl FormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A filesystem operation failed while preparing or tearing down an execution.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to create directory `{path}`")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open `{path}`")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove `{path}`")]
    Remove {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reap child for `{control_dir}`")]
    Reap {
        control_dir: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Spawning a child process failed before it could start running.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] IoError),
}

/// A user-supplied filter string or metadata property was invalid.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct UsageError {
    message: String,
}

impl UsageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Raised by [`crate::interrupt::InterruptController::check_interrupt`] when a shutdown signal
/// has been delivered and already acted upon.
#[derive(Clone, Copy, Debug, Error)]
#[error("interrupted by signal {0}")]
pub struct Interrupted(pub i32);

/// Top-level error returned by the scheduler and adapters.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}
