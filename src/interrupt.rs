// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide shutdown signal handling.
//!
//! A dedicated OS thread is the sole consumer of SIGHUP/SIGINT/SIGTERM. On the first delivery it
//! kills every registered subprocess group; on a second delivery (the user is impatient, or
//! cleanup is hanging) it re-raises the signal with its default disposition immediately,
//! bypassing cleanup.
//!
//! This is implemented with `signal-hook`'s self-pipe-backed [`signal_hook::iterator::Signals`]
//! rather than a raw `sigsuspend` loop: the handler `signal-hook` installs is a few
//! async-signal-safe instructions regardless of which thread the kernel happens to run it on, so
//! the "only consumer" property holds without also having to mask the three signals on every
//! other thread in the process.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::errors::Interrupted;

#[derive(Default)]
struct State {
    /// Set once the first signal has been observed and its kill loop has started; cleared by
    /// `check_interrupt` once it has reported the interruption to a caller.
    which_fired: Option<i32>,
    /// Set once the kill loop for `which_fired` has finished killing every registered pid.
    killed: bool,
}

struct Shared {
    pids: Mutex<HashSet<i32>>,
    state: Mutex<State>,
    cond: Condvar,
}

/// Process-wide controller for shutdown signals.
///
/// Constructed once via [`InterruptController::setup`] near the start of `main`. Cloning shares
/// the same underlying state; the signals thread keeps running for the lifetime of the process.
#[derive(Clone)]
pub struct InterruptController {
    shared: Arc<Shared>,
}

impl InterruptController {
    /// Installs the signal handler and starts the dedicated signals thread.
    pub fn setup() -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            pids: Mutex::new(HashSet::new()),
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        });

        let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM])?;
        let thread_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("casecore-signals".to_owned())
            .spawn(move || Self::run_signals_thread(&mut signals, thread_shared))?;

        Ok(Self { shared })
    }

    fn run_signals_thread(signals: &mut Signals, shared: Arc<Shared>) {
        let mut delivered_once = false;
        for signo in signals.forever() {
            if !delivered_once {
                delivered_once = true;
                tracing::warn!(signo, "shutdown signal received, killing all subprocesses");

                {
                    let mut state = shared.state.lock().unwrap();
                    state.which_fired = Some(signo);
                }

                let pids: Vec<i32> = shared.pids.lock().unwrap().iter().copied().collect();
                for pid in pids {
                    let _ = nix::sys::signal::killpg(
                        nix::unistd::Pid::from_raw(pid),
                        nix::sys::signal::Signal::SIGKILL,
                    );
                }

                let mut state = shared.state.lock().unwrap();
                state.killed = true;
                shared.cond.notify_all();
            } else {
                tracing::warn!(signo, "second shutdown signal received, terminating immediately");
                signal_hook::low_level::emulate_default_handler(signo).ok();
            }
        }
    }

    /// Registers `pid` (a process group leader) to be killed on interrupt.
    ///
    /// # Panics
    /// Panics if `pid` is already registered.
    pub fn add_pid_to_kill(&self, pid: i32) {
        let mut pids = self.shared.pids.lock().unwrap();
        assert!(pids.insert(pid), "pid {pid} registered with the interrupt controller twice");
    }

    /// Unregisters `pid`.
    ///
    /// # Panics
    /// Panics if `pid` was not registered.
    pub fn remove_pid_to_kill(&self, pid: i32) {
        let mut pids = self.shared.pids.lock().unwrap();
        assert!(pids.remove(&pid), "pid {pid} was not registered with the interrupt controller");
    }

    /// Returns `Err(Interrupted(signo))` if a shutdown signal has fired and its kill loop has
    /// completed; otherwise returns `Ok(())`. Raises each signal delivery at most once.
    pub fn check_interrupt(&self) -> Result<(), Interrupted> {
        let mut state = self.shared.state.lock().unwrap();
        let Some(signo) = state.which_fired else {
            return Ok(());
        };
        while !state.killed {
            state = self.shared.cond.wait(state).unwrap();
        }
        state.which_fired = None;
        Err(Interrupted(signo))
    }

    /// Re-raises `signo` with its default disposition so the process terminates with the
    /// conventional `128 + signo` exit status. Called by the caller after it has caught
    /// [`Interrupted`] and finished cleanup.
    pub fn redeliver_to_exit(&self, signo: i32) -> ! {
        signal_hook::low_level::emulate_default_handler(signo).ok();
        // emulate_default_handler terminates the process for the signals we register (all of
        // which default to terminating); if it somehow returns, force the point home.
        std::process::exit(128 + signo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_interrupt_is_ok_with_no_signal() {
        let shared = Arc::new(Shared {
            pids: Mutex::new(HashSet::new()),
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        });
        let controller = InterruptController { shared };
        assert!(controller.check_interrupt().is_ok());
    }

    #[test]
    fn check_interrupt_reports_and_clears_once() {
        let shared = Arc::new(Shared {
            pids: Mutex::new(HashSet::new()),
            state: Mutex::new(State { which_fired: Some(SIGINT), killed: true }),
            cond: Condvar::new(),
        });
        let controller = InterruptController { shared };
        let err = controller.check_interrupt().unwrap_err();
        assert_eq!(err.0, SIGINT);
        assert!(controller.check_interrupt().is_ok());
    }

    #[test]
    #[should_panic]
    fn double_add_panics() {
        let shared = Arc::new(Shared {
            pids: Mutex::new(HashSet::new()),
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        });
        let controller = InterruptController { shared };
        controller.add_pid_to_kill(42);
        controller.add_pid_to_kill(42);
    }

    #[test]
    #[should_panic]
    fn remove_absent_panics() {
        let shared = Arc::new(Shared {
            pids: Mutex::new(HashSet::new()),
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        });
        let controller = InterruptController { shared };
        controller.remove_pid_to_kill(42);
    }
}
