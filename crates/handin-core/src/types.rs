use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of one submission event. A given mtime version of a file
/// moves forward through at most one of queued→running→{completed, killed,
/// failed}, or lands directly on `FileTooLarge` without ever being queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Queued,
    Running,
    Completed,
    Killed,
    Failed(i32),
    FileTooLarge,
}

impl Status {
    /// True for every terminal state the status page aggregates as "failed":
    /// non-zero exits, timeout kills, and oversize rejections.
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failed(_) | Status::Killed | Status::FileTooLarge)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Queued | Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Queued => f.write_str("queued"),
            Status::Running => f.write_str("running"),
            Status::Completed => f.write_str("completed"),
            Status::Killed => f.write_str("killed"),
            Status::Failed(code) => write!(f, "failed({code})"),
            Status::FileTooLarge => f.write_str("file_too_large"),
        }
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::HandinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => return Ok(Status::Queued),
            "running" => return Ok(Status::Running),
            "completed" => return Ok(Status::Completed),
            "killed" => return Ok(Status::Killed),
            "file_too_large" => return Ok(Status::FileTooLarge),
            _ => {}
        }
        if let Some(code) = s
            .strip_prefix("failed(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            if let Ok(code) = code.parse::<i32>() {
                return Ok(Status::Failed(code));
            }
        }
        Err(crate::error::HandinError::Config(format!(
            "unknown status '{s}'"
        )))
    }
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
