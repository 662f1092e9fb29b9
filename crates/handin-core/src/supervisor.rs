use crate::error::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal result of one supervised grading run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit code 0.
    Completed,
    /// Non-zero exit code, or -1 when the child died to a signal.
    Failed(i32),
    /// Forcibly terminated for overrunning its wall-clock budget.
    Killed,
}

/// Deterministic per-action log paths; duplicate runs for the same
/// `(project, filename)` overwrite the previous logs.
pub fn log_paths(log_dir: &Path, project: &str, filename: &str) -> (PathBuf, PathBuf) {
    (
        log_dir.join(format!("stdout.{project}.{filename}")),
        log_dir.join(format!("stderr.{project}.{filename}")),
    )
}

/// Best-effort cleanup of logs from a previous run of the same action.
pub fn remove_stale_logs(stdout_path: &Path, stderr_path: &Path) {
    for path in [stdout_path, stderr_path] {
        if path.exists() {
            match std::fs::remove_file(path) {
                Ok(()) => info!(path = %path.display(), "removed stale log"),
                Err(e) => warn!(path = %path.display(), "could not remove stale log: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// run_action
// ---------------------------------------------------------------------------

/// One queued grading invocation, ready to execute.
pub struct RunSpec<'a> {
    pub action: &'a Path,
    pub project: &'a str,
    pub filename: &'a str,
    pub time_limit: Duration,
    pub stdout_path: &'a Path,
    pub stderr_path: &'a Path,
}

/// Run a grading action to completion under its wall-clock budget.
///
/// The child is spawned with positional arguments `(project, filename)`,
/// stdout/stderr redirected to the per-action log files, and placed in its
/// own process group so a timeout kill takes any grandchildren with it.
/// The wait is a blocking `recv_timeout` on a waiter thread, not a poll
/// loop.
///
/// `Err` means the supervisor itself could not start or reap the child
/// (missing executable, log file unwritable); the caller records that as a
/// failure of this submission only.
pub fn run_action(spec: &RunSpec) -> Result<Outcome> {
    let stdout = File::create(spec.stdout_path)?;
    let stderr = File::create(spec.stderr_path)?;

    info!(
        action = %spec.action.display(),
        project = spec.project,
        filename = spec.filename,
        "executing action"
    );

    let mut cmd = Command::new(spec.action);
    cmd.arg(spec.project)
        .arg(spec.filename)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn()?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait());
    });

    match rx.recv_timeout(spec.time_limit) {
        Ok(wait_result) => {
            let status = wait_result?;
            match status.code() {
                Some(0) => Ok(Outcome::Completed),
                Some(code) => {
                    info!(code, "action returned non-zero");
                    Ok(Outcome::Failed(code))
                }
                // No exit code: the child died to a signal.
                None => Ok(Outcome::Failed(-1)),
            }
        }
        Err(_) => {
            warn!(
                pid,
                limit_secs = spec.time_limit.as_secs_f64(),
                "process is overtime, killing process group"
            );
            kill_group(pid);
            // Reap through the waiter thread so the child doesn't linger as
            // a zombie; the kill makes this return promptly.
            let _ = rx.recv_timeout(Duration::from_secs(5));
            Ok(Outcome::Killed)
        }
    }
}

/// SIGKILL the child's entire process group. Best-effort; errors are
/// silently ignored.
fn kill_group(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg("--")
        .arg(format!("-{pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn spec<'a>(
        action: &'a Path,
        stdout_path: &'a Path,
        stderr_path: &'a Path,
        time_limit: Duration,
    ) -> RunSpec<'a> {
        RunSpec {
            action,
            project: "project1",
            filename: "alice.tar",
            time_limit,
            stdout_path,
            stderr_path,
        }
    }

    #[test]
    fn zero_exit_completes() {
        let dir = TempDir::new().unwrap();
        let action = write_script(&dir, "grade.sh", "echo graded $1 $2\nexit 0");
        let out = dir.path().join("stdout");
        let err = dir.path().join("stderr");
        let outcome = run_action(&spec(&action, &out, &err, Duration::from_secs(10))).unwrap();
        assert_eq!(outcome, Outcome::Completed);
        let captured = std::fs::read_to_string(&out).unwrap();
        assert_eq!(captured, "graded project1 alice.tar\n");
    }

    #[test]
    fn nonzero_exit_fails_with_code() {
        let dir = TempDir::new().unwrap();
        let action = write_script(&dir, "grade.sh", "echo oops >&2\nexit 3");
        let out = dir.path().join("stdout");
        let err = dir.path().join("stderr");
        let outcome = run_action(&spec(&action, &out, &err, Duration::from_secs(10))).unwrap();
        assert_eq!(outcome, Outcome::Failed(3));
        assert_eq!(std::fs::read_to_string(&err).unwrap(), "oops\n");
    }

    #[test]
    fn overtime_process_is_killed() {
        let dir = TempDir::new().unwrap();
        let action = write_script(&dir, "grade.sh", "sleep 30");
        let out = dir.path().join("stdout");
        let err = dir.path().join("stderr");
        let start = std::time::Instant::now();
        let outcome =
            run_action(&spec(&action, &out, &err, Duration::from_millis(200))).unwrap();
        assert_eq!(outcome, Outcome::Killed);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_action_is_an_error() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("stdout");
        let err = dir.path().join("stderr");
        let action = dir.path().join("does-not-exist.sh");
        assert!(run_action(&spec(&action, &out, &err, Duration::from_secs(1))).is_err());
    }

    #[test]
    fn log_paths_are_deterministic() {
        let (out, err) = log_paths(Path::new("/var/log/handin"), "project1", "alice.tar");
        assert_eq!(out, Path::new("/var/log/handin/stdout.project1.alice.tar"));
        assert_eq!(err, Path::new("/var/log/handin/stderr.project1.alice.tar"));
    }

    #[test]
    fn stale_log_removal_is_best_effort() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("stdout.project1.alice.tar");
        std::fs::write(&out, "old").unwrap();
        let err = dir.path().join("stderr.project1.alice.tar");
        // err does not exist; out does — both paths must be handled quietly.
        remove_stale_logs(&out, &err);
        assert!(!out.exists());
    }
}
