use crate::error::{HandinError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::UNIX_EPOCH;
use tracing::debug;

// ---------------------------------------------------------------------------
// StoreEntry
// ---------------------------------------------------------------------------

/// Metadata for one file in a submission directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub size: u64,
    /// Modification time, unix seconds.
    pub mtime: u64,
}

// ---------------------------------------------------------------------------
// SubmissionStore
// ---------------------------------------------------------------------------

/// Uniform listing over wherever submissions are uploaded.
///
/// Both implementations return `list` results sorted by ascending mtime so
/// the oldest submission is serviced first. Any listing failure maps to
/// `StoreUnavailable`: fatal for the current discovery pass, retried on the
/// next invocation.
pub trait SubmissionStore {
    /// Names of the immediate children of `dir`.
    fn list_names(&mut self, dir: &Path) -> Result<Vec<String>>;

    /// Regular files directly under `dir` with size and mtime, oldest first.
    fn list(&mut self, dir: &Path) -> Result<Vec<StoreEntry>>;
}

fn sort_oldest_first(entries: &mut [StoreEntry]) {
    entries.sort_by(|a, b| a.mtime.cmp(&b.mtime).then_with(|| a.name.cmp(&b.name)));
}

// ---------------------------------------------------------------------------
// LocalStore
// ---------------------------------------------------------------------------

/// Submission store backed by the local filesystem.
#[derive(Debug, Default)]
pub struct LocalStore;

impl SubmissionStore for LocalStore {
    fn list_names(&mut self, dir: &Path) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(dir).map_err(|e| unavailable(dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn list(&mut self, dir: &Path) -> Result<Vec<StoreEntry>> {
        let read = std::fs::read_dir(dir).map_err(|e| unavailable(dir, e))?;
        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| unavailable(dir, e))?;
            let meta = entry.metadata().map_err(|e| unavailable(dir, e))?;
            if !meta.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            entries.push(StoreEntry {
                name,
                size: meta.len(),
                mtime,
            });
        }
        sort_oldest_first(&mut entries);
        Ok(entries)
    }
}

fn unavailable(dir: &Path, e: std::io::Error) -> HandinError {
    HandinError::StoreUnavailable(format!("{}: {e}", dir.display()))
}

// ---------------------------------------------------------------------------
// RemoteStore
// ---------------------------------------------------------------------------

/// Submission store on a remote host, reached through the system `ssh`
/// client in batch mode with key-based authentication (no prompts). Each
/// listing is one remote `find` invocation printing a fixed
/// `name size mtime` line format.
#[derive(Debug)]
pub struct RemoteStore {
    ssh: PathBuf,
    host: String,
    username: String,
    key_file: PathBuf,
}

impl RemoteStore {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        key_file: impl Into<PathBuf>,
    ) -> Result<Self> {
        let ssh = which::which("ssh")
            .map_err(|_| HandinError::StoreUnavailable("no ssh client found on PATH".into()))?;
        Ok(Self {
            ssh,
            host: host.into(),
            username: username.into(),
            key_file: key_file.into(),
        })
    }

    fn run(&self, remote_cmd: &str) -> Result<String> {
        debug!(host = %self.host, cmd = remote_cmd, "remote listing");
        let output = Command::new(&self.ssh)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-i")
            .arg(&self.key_file)
            .arg(format!("{}@{}", self.username, self.host))
            .arg(remote_cmd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| HandinError::StoreUnavailable(format!("failed to spawn ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HandinError::StoreUnavailable(format!(
                "ssh to {}@{} failed: {}",
                self.username,
                self.host,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SubmissionStore for RemoteStore {
    fn list_names(&mut self, dir: &Path) -> Result<Vec<String>> {
        let cmd = format!(
            "find '{}' -mindepth 1 -maxdepth 1 -printf '%f\\n'",
            dir.display()
        );
        let out = self.run(&cmd)?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn list(&mut self, dir: &Path) -> Result<Vec<StoreEntry>> {
        let cmd = format!(
            "find '{}' -mindepth 1 -maxdepth 1 -type f -printf '%f %s %T@\\n'",
            dir.display()
        );
        let out = self.run(&cmd)?;
        let mut entries = Vec::new();
        for line in out.lines() {
            entries.push(parse_remote_line(line)?);
        }
        sort_oldest_first(&mut entries);
        Ok(entries)
    }
}

/// Parse one `name size mtime` listing line. The name may contain spaces, so
/// size and mtime are taken from the right.
fn parse_remote_line(line: &str) -> Result<StoreEntry> {
    let bad = || HandinError::StoreUnavailable(format!("unparseable remote listing line: {line}"));
    let mut fields = line.rsplitn(3, ' ');
    let mtime: f64 = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
    let size: u64 = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
    let name = fields.next().filter(|n| !n.is_empty()).ok_or_else(bad)?;
    Ok(StoreEntry {
        name: name.to_string(),
        size,
        mtime: mtime as u64,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
