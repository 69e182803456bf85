// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Termination status of a reaped child process.
//!
//! [`Status`] is constructed only from a real wait result; there is no way to build one that
//! doesn't correspond to an actual `waitpid(2)` outcome.

use std::fmt;

/// How a child process terminated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Exited { pid: i32, code: i32 },
    Signaled { pid: i32, signo: i32, coredump: bool },
}

impl Status {
    /// Builds a `Status` from a raw `waitpid` triple, as returned by `libc::WIFEXITED` et al.
    pub fn from_raw(pid: i32, wait_status: nix::sys::wait::WaitStatus) -> Option<Self> {
        use nix::sys::wait::WaitStatus as W;
        match wait_status {
            W::Exited(got_pid, code) if i32::from(got_pid) == pid => {
                Some(Self::Exited { pid, code })
            }
            W::Signaled(got_pid, signal, coredump) if i32::from(got_pid) == pid => {
                Some(Self::Signaled {
                    pid,
                    signo: signal as i32,
                    coredump,
                })
            }
            _ => None,
        }
    }

    /// Builds a `Status` from a [`std::process::ExitStatus`], as returned by `tokio::process`.
    ///
    /// `std::process::ExitStatus` already folds exited/signaled into one type on Unix; this
    /// reconstructs our richer tagged representation from it.
    pub fn from_exit_status(pid: i32, status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match status.code() {
            Some(code) => Self::Exited { pid, code },
            None => {
                let signo = status.signal().expect("non-exited status must carry a signal");
                Self::Signaled {
                    pid,
                    signo,
                    coredump: status.core_dumped(),
                }
            }
        }
    }

    pub fn exited(&self) -> bool {
        matches!(self, Self::Exited { .. })
    }

    /// Panics if `!self.exited()`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exited { code, .. } => *code,
            Self::Signaled { .. } => panic!("exit_code() called on a signaled status"),
        }
    }

    pub fn signaled(&self) -> bool {
        matches!(self, Self::Signaled { .. })
    }

    /// Panics if `!self.signaled()`.
    pub fn term_signal(&self) -> i32 {
        match self {
            Self::Signaled { signo, .. } => *signo,
            Self::Exited { .. } => panic!("term_signal() called on an exited status"),
        }
    }

    pub fn core_dumped(&self) -> bool {
        matches!(self, Self::Signaled { coredump: true, .. })
    }

    pub fn dead_pid(&self) -> i32 {
        match self {
            Self::Exited { pid, .. } | Self::Signaled { pid, .. } => *pid,
        }
    }

    /// True if the process exited with code 0.
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0, .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code, .. } => write!(f, "exited with code {code}"),
            Self::Signaled { signo, coredump: true, .. } => {
                write!(f, "received signal {signo} (core dumped)")
            }
            Self::Signaled { signo, .. } => write!(f, "received signal {signo}"),
        }
    }
}
