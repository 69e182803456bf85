// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot deadline enforcement for a single child process.
//!
//! A process-wide `SIGALRM`/`setitimer` scheme forces callers to serialize: at most one
//! [`DeadlineKiller`] may be armed at a time. We instead give every killer its own `tokio` timer
//! task, which removes that restriction (see DESIGN.md) at the cost of one task per outstanding
//! child.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Programs a one-shot timer that SIGKILLs a process group when it expires.
///
/// A zero `timeout` disables the deadline entirely: `new` returns a killer that never fires and
/// whose `unprogram` is a no-op.
#[derive(Debug)]
pub struct DeadlineKiller {
    fired: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl DeadlineKiller {
    /// Arms a killer for process group `pgid`. `timeout` of zero means "no deadline".
    pub fn new(timeout: Duration, pgid: i32) -> Self {
        if timeout.is_zero() {
            return Self {
                fired: Arc::new(AtomicBool::new(false)),
                task: None,
            };
        }

        let fired = Arc::new(AtomicBool::new(false));
        let task_fired = Arc::clone(&fired);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            task_fired.store(true, Ordering::SeqCst);
            // Best-effort: the process group may already be gone.
            let _ = signal::killpg(Pid::from_raw(pgid), Signal::SIGKILL);
        });

        Self {
            fired,
            task: Some(task),
        }
    }

    /// Cancels the timer. Idempotent; must be called on every path before the killer is dropped
    /// so that a late-firing timer can never race a PID that has since been reused.
    pub async fn unprogram(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    /// Whether the deadline fired. Only meaningful after `unprogram` has completed.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for DeadlineKiller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
