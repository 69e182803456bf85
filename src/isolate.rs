// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Child-side isolation performed between `fork` and `exec`.
//!
//! Everything here runs in the forked child, before the test program's binary replaces it, via
//! [`std::os::unix::process::CommandExt::pre_exec`]. Because `pre_exec` closures run
//! post-`fork`/pre-`exec`, only async-signal-safe operations are permitted — no allocation beyond
//! what the closure's captures already hold, no panicking paths that unwind across the fork
//! boundary.

use camino::Utf8Path;
use std::io;
use tokio::process::Command;

const LOCALE_VARS: &[&str] = &[
    "LANG",
    "LC_ALL",
    "LC_COLLATE",
    "LC_CTYPE",
    "LC_MESSAGES",
    "LC_MONETARY",
    "LC_NUMERIC",
    "LC_TIME",
];

/// An unprivileged `(uid, gid)` pair to switch to after isolation, when the current process is
/// privileged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnprivilegedUser {
    pub uid: u32,
    pub gid: u32,
}

/// Installs the isolation `pre_exec` hook on `cmd`. Must be called before `cmd.spawn()`.
pub fn install(cmd: &mut Command, work_dir: &Utf8Path, unprivileged_user: Option<UnprivilegedUser>) {
    // New process group: the executor and the interrupt controller signal process groups, not
    // individual pids, so every child must lead its own group.
    cmd.process_group(0);

    for var in LOCALE_VARS {
        cmd.env_remove(var);
    }
    cmd.env("TZ", "UTC");
    cmd.env("HOME", work_dir.as_str());
    cmd.current_dir(work_dir);

    let work_dir = work_dir.to_owned();
    unsafe {
        cmd.pre_exec(move || isolate_child(&work_dir, unprivileged_user));
    }
}

/// Runs in the child after `fork`, before `exec`. Returning `Err` aborts the exec with that
/// error reported back to the parent via the normal `pre_exec` contract.
fn isolate_child(work_dir: &Utf8Path, unprivileged_user: Option<UnprivilegedUser>) -> io::Result<()> {
    reset_signal_dispositions();

    // umask(2) cannot fail.
    nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(0o022));

    // `Command::current_dir`/`process_group` above already requested this, but pre_exec runs
    // after fork and we want a hard failure here rather than a silently-ignored chdir.
    nix::unistd::chdir(work_dir.as_std_path()).map_err(io::Error::from)?;

    if let Some(user) = unprivileged_user {
        if nix::unistd::getuid().is_root() {
            nix::unistd::setgid(nix::unistd::Gid::from_raw(user.gid)).map_err(io::Error::from)?;
            nix::unistd::setuid(nix::unistd::Uid::from_raw(user.uid)).map_err(io::Error::from)?;
        }
    }

    Ok(())
}

/// Resets every signal except SIGKILL/SIGSTOP to its default disposition, ignoring individual
/// failures (some signal numbers are reserved or unavailable on a given platform).
///
/// This covers the real-time signal range too, which `nix::sys::signal::Signal` doesn't
/// enumerate, so it goes directly through `libc::signal` rather than nix's typed wrapper.
fn reset_signal_dispositions() {
    let last_signo = unsafe { libc::SIGRTMAX() };
    for signo in 1..=last_signo {
        if signo == libc::SIGKILL || signo == libc::SIGSTOP {
            continue;
        }
        // Safety: we're in a pre_exec hook between fork and exec; installing SIG_DFL is
        // async-signal-safe and affects only this not-yet-exec'd process image. A failure here
        // (e.g. an invalid signal number on this platform) is intentionally ignored.
        unsafe {
            libc::signal(signo, libc::SIG_DFL);
        }
    }
}
