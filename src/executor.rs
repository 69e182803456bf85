// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawns isolated child processes, enforces their deadlines, and reaps them.
//!
//! The executor owns a root scratch directory (`$TMPDIR/kyua.XXXXXX`, or `/tmp/kyua.XXXXXX`
//! without `TMPDIR`) and a map from PID to in-flight bookkeeping. Handles are plain PIDs
//! ([`ExecHandle`]) rather than references into that map, so an [`ExitHandle`] can call back into
//! the executor on cleanup without a cyclic borrow (see the "cyclic lifetime" design note).

use crate::deadline::DeadlineKiller;
use crate::errors::{CoreError, IoError, SpawnError};
use crate::interrupt::InterruptController;
use crate::isolate::{self, UnprivilegedUser};
use crate::status::Status;
use crate::time::Timestamp;

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use futures::future::select_all;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Identifies a spawned-but-not-yet-reaped child.
///
/// Equal to the child's PID at spawn time; once [`Executor::wait`]/[`Executor::wait_any`] returns
/// the corresponding [`ExitHandle`], the PID may be reused by the OS and this handle must not be
/// used again.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ExecHandle(i32);

impl ExecHandle {
    pub fn pid(self) -> i32 {
        self.0
    }
}

struct ExecEntry {
    child: Child,
    control_dir: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    stdout_file: Utf8PathBuf,
    stderr_file: Utf8PathBuf,
    start: Timestamp,
    killer: DeadlineKiller,
    unprivileged_user: Option<UnprivilegedUser>,
    is_followup: bool,
}

/// Owns the scratch-directory tree and the set of outstanding children.
pub struct Executor {
    _root_dir: Utf8TempDir,
    root: Utf8PathBuf,
    counter: AtomicU64,
    entries: Mutex<HashMap<i32, ExecEntry>>,
    interrupt: InterruptController,
}

impl Executor {
    /// Creates the root scratch directory and binds the executor to `interrupt`, so every spawned
    /// child is automatically registered for process-wide kill-on-signal.
    pub fn new(interrupt: InterruptController) -> Result<Self, IoError> {
        let root_dir = camino_tempfile::Builder::new()
            .prefix("kyua.")
            .tempdir()
            .map_err(|source| IoError::CreateDir { path: Utf8PathBuf::from("<tmp root>"), source })?;
        let root = root_dir.path().to_owned();
        tracing::debug!(%root, "executor scratch directory created");
        Ok(Self {
            _root_dir: root_dir,
            root,
            counter: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
            interrupt,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Delegates to [`InterruptController::check_interrupt`]. Callers must check this immediately
    /// before [`Self::spawn_pre`] so an in-flight interrupt is observed before new scratch
    /// resources are allocated.
    pub fn check_interrupt(&self) -> Result<(), crate::errors::Interrupted> {
        self.interrupt.check_interrupt()
    }

    /// Allocates a fresh control directory (`<root>/<N>/`) with an empty `work/` subdirectory
    /// inside it, and returns the control directory path.
    ///
    /// Callers must have checked [`InterruptController::check_interrupt`] immediately before
    /// calling this, so an in-flight interrupt is observed before new scratch resources are
    /// allocated.
    pub fn spawn_pre(&self) -> Result<Utf8PathBuf, IoError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let control_dir = self.root.join(n.to_string());
        let work_dir = control_dir.join("work");
        std::fs::create_dir_all(&work_dir)
            .map_err(|source| IoError::CreateDir { path: work_dir.clone(), source })?;
        set_mode(&control_dir, 0o755)?;
        set_mode(&work_dir, 0o755)?;
        Ok(control_dir)
    }

    /// Spawns `program` with `args` inside `control_dir` (as allocated by [`Self::spawn_pre`]),
    /// redirecting stdout/stderr to files inside it and applying [`isolate::install`].
    ///
    /// Registers the child's process group with the interrupt controller and arms a
    /// [`DeadlineKiller`] before returning, closing the window in which a concurrent interrupt
    /// could miss this child.
    pub async fn spawn(
        &self,
        control_dir: &Utf8Path,
        program: &Utf8Path,
        args: &[String],
        extra_env: &[(String, String)],
        timeout: Duration,
        user: Option<UnprivilegedUser>,
    ) -> Result<ExecHandle, CoreError> {
        let work_dir = control_dir.join("work");
        let stdout_file = control_dir.join("stdout");
        let stderr_file = control_dir.join("stderr");
        let entry = self
            .spawn_into(program, args, extra_env, &work_dir, &stdout_file, &stderr_file, timeout, user, control_dir, false)
            .await?;
        let pid = entry.child.id().expect("freshly spawned child has a pid") as i32;
        self.entries.lock().await.insert(pid, entry);
        Ok(ExecHandle(pid))
    }

    /// Spawns a follow-up child (the ATF cleanup phase) reusing `base`'s control/work/stdout/
    /// stderr files. The resulting entry is marked `is_followup`, so its eventual [`ExitHandle`]
    /// will not remove the shared control directory.
    pub async fn spawn_followup(
        &self,
        base: &ExitHandle,
        program: &Utf8Path,
        args: &[String],
        extra_env: &[(String, String)],
        timeout: Duration,
    ) -> Result<ExecHandle, CoreError> {
        let entry = self
            .spawn_into(
                program,
                args,
                extra_env,
                &base.work_directory,
                &base.stdout_file,
                &base.stderr_file,
                timeout,
                base.unprivileged_user,
                &base.control_directory,
                true,
            )
            .await?;
        let pid = entry.child.id().expect("freshly spawned child has a pid") as i32;
        self.entries.lock().await.insert(pid, entry);
        Ok(ExecHandle(pid))
    }

    #[allow(clippy::too_many_arguments)]
    async fn spawn_into(
        &self,
        program: &Utf8Path,
        args: &[String],
        extra_env: &[(String, String)],
        work_dir: &Utf8Path,
        stdout_file: &Utf8Path,
        stderr_file: &Utf8Path,
        timeout: Duration,
        user: Option<UnprivilegedUser>,
        control_dir: &Utf8Path,
        is_followup: bool,
    ) -> Result<ExecEntry, CoreError> {
        let stdout = open_truncated(stdout_file)?;
        let stderr = open_truncated(stderr_file)?;

        let mut cmd = Command::new(program.as_std_path());
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(stdout);
        cmd.stderr(stderr);
        cmd.kill_on_drop(false);
        for (key, value) in extra_env {
            cmd.env(key, value);
        }
        isolate::install(&mut cmd, work_dir, user);

        tracing::debug!(%program, ?args, "spawning test program");
        let mut child = cmd
            .spawn()
            .map_err(|source| SpawnError::Spawn { program: program.to_owned(), source })?;
        let pid = child.id().expect("freshly spawned child has a pid") as i32;

        self.interrupt.add_pid_to_kill(pid);
        let killer = DeadlineKiller::new(timeout, pid);

        Ok(ExecEntry {
            child,
            control_dir: control_dir.to_owned(),
            work_dir: work_dir.to_owned(),
            stdout_file: stdout_file.to_owned(),
            stderr_file: stderr_file.to_owned(),
            start: Timestamp::now(),
            killer,
            unprivileged_user: user,
            is_followup,
        })
    }

    /// Waits for a specific outstanding child.
    ///
    /// # Panics
    /// Panics if `handle` does not correspond to a currently outstanding child (it was never
    /// spawned by this executor, or has already been waited on).
    pub async fn wait(&self, handle: ExecHandle) -> Result<ExitHandle, CoreError> {
        let mut entry = {
            let mut entries = self.entries.lock().await;
            entries
                .remove(&handle.0)
                .unwrap_or_else(|| panic!("wait called with unknown or already-reaped pid {}", handle.0))
        };
        let wait_result = entry.child.wait().await;
        self.finish_wait(handle.0, entry, wait_result).await
    }

    /// Waits for whichever outstanding child reaps first.
    ///
    /// # Panics
    /// Panics if there are no outstanding children.
    pub async fn wait_any(&self) -> Result<ExitHandle, CoreError> {
        let mut taken: Vec<(i32, ExecEntry)> = {
            let mut entries = self.entries.lock().await;
            let pids: Vec<i32> = entries.keys().copied().collect();
            pids.into_iter().map(|pid| (pid, entries.remove(&pid).unwrap())).collect()
        };
        assert!(!taken.is_empty(), "wait_any called with no outstanding children");

        let (wait_result, index) = {
            let futs: Vec<_> = taken.iter_mut().map(|(_, entry)| Box::pin(entry.child.wait())).collect();
            let (result, index, _rest) = select_all(futs).await;
            (result, index)
        };

        let (pid, entry) = taken.remove(index);
        {
            let mut entries = self.entries.lock().await;
            for (p, e) in taken {
                entries.insert(p, e);
            }
        }

        self.finish_wait(pid, entry, wait_result).await
    }

    async fn finish_wait(
        &self,
        pid: i32,
        mut entry: ExecEntry,
        wait_result: std::io::Result<std::process::ExitStatus>,
    ) -> Result<ExitHandle, CoreError> {
        entry.killer.unprogram().await;
        self.interrupt.remove_pid_to_kill(pid);
        touch_if_missing(&entry.stdout_file)?;
        touch_if_missing(&entry.stderr_file)?;

        let status = if entry.killer.fired() {
            None
        } else {
            let exit_status = wait_result
                .map_err(|source| IoError::Reap { control_dir: entry.control_dir.clone(), source })?;
            Some(Status::from_exit_status(pid, exit_status))
        };

        Ok(ExitHandle {
            original_exec_handle: ExecHandle(pid),
            status,
            unprivileged_user: entry.unprivileged_user,
            start_time: entry.start,
            end_time: Timestamp::now(),
            control_directory: entry.control_dir,
            work_directory: entry.work_dir,
            stdout_file: entry.stdout_file,
            stderr_file: entry.stderr_file,
            is_followup: entry.is_followup,
            cleaned: false,
        })
    }

    /// Terminates and reaps every outstanding child, then removes the whole scratch tree.
    /// Idempotent: a second call finds nothing outstanding and the root already gone.
    pub async fn cleanup(&self) {
        let mut entries = self.entries.lock().await;
        for (pid, mut entry) in entries.drain() {
            let _ = nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGKILL);
            if let Err(error) = entry.child.wait().await {
                tracing::warn!(pid, %error, "failed to reap child during executor cleanup");
            }
            self.interrupt.remove_pid_to_kill(pid);
            remove_dir_best_effort(&entry.control_dir);
        }
        drop(entries);
        remove_dir_best_effort(&self.root);
    }
}

/// Removes a control directory or scratch root, logging via [`IoError::Remove`] on any failure
/// other than the path already being gone.
fn remove_dir_best_effort(path: &Utf8Path) {
    if let Err(source) = std::fs::remove_dir_all(path) {
        if source.kind() != std::io::ErrorKind::NotFound {
            let error = IoError::Remove { path: path.to_owned(), source };
            tracing::warn!(%error, "failed to remove directory");
        }
    }
}

/// A reaped child, yielded by [`Executor::wait`]/[`Executor::wait_any`].
///
/// Owns the control-directory tree unless it's a follow-up execution, in which case the base
/// execution owns it. [`Self::cleanup`] must be called exactly once; dropping without calling it
/// logs a warning and best-effort cleans.
#[derive(Debug)]
pub struct ExitHandle {
    original_exec_handle: ExecHandle,
    status: Option<Status>,
    unprivileged_user: Option<UnprivilegedUser>,
    start_time: Timestamp,
    end_time: Timestamp,
    control_directory: Utf8PathBuf,
    work_directory: Utf8PathBuf,
    stdout_file: Utf8PathBuf,
    stderr_file: Utf8PathBuf,
    is_followup: bool,
    cleaned: bool,
}

impl ExitHandle {
    pub fn original_exec_handle(&self) -> ExecHandle {
        self.original_exec_handle
    }

    /// `None` means the child was killed by its deadline rather than reaped normally.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn unprivileged_user(&self) -> Option<UnprivilegedUser> {
        self.unprivileged_user
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    pub fn control_directory(&self) -> &Utf8Path {
        &self.control_directory
    }

    pub fn work_directory(&self) -> &Utf8Path {
        &self.work_directory
    }

    pub fn stdout_file(&self) -> &Utf8Path {
        &self.stdout_file
    }

    pub fn stderr_file(&self) -> &Utf8Path {
        &self.stderr_file
    }

    /// Removes the control-directory tree, unless this is a follow-up execution (in which case
    /// the base execution owns it). Idempotent.
    pub fn cleanup(&mut self) {
        if self.cleaned || self.is_followup {
            self.cleaned = true;
            return;
        }
        remove_dir_best_effort(&self.control_directory);
        self.cleaned = true;
    }
}

impl Drop for ExitHandle {
    fn drop(&mut self) {
        if !self.cleaned {
            tracing::warn!(
                path = %self.control_directory,
                "ExitHandle dropped without an explicit cleanup() call; cleaning up best-effort"
            );
            self.cleanup();
        }
    }
}

fn set_mode(path: &Utf8Path, mode: u32) -> Result<(), IoError> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|source| IoError::CreateDir { path: path.to_owned(), source })
}

fn open_truncated(path: &Utf8Path) -> Result<std::fs::File, IoError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map_err(|source| IoError::Open { path: path.to_owned(), source })
}

/// Ensures `path` exists (empty) so downstream code can always open it, even if the child never
/// wrote to it (and, for stdout/stderr on a process that was SIGKILLed before `exec`, never even
/// created it).
fn touch_if_missing(path: &Utf8Path) -> Result<(), IoError> {
    if path.exists() {
        return Ok(());
    }
    open_truncated(path).map(|_| ())
}
