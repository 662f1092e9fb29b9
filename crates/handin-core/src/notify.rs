use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Usernames with this prefix belong to synthetic web-upload accounts;
/// mailing them would loop notifications back into the pipeline.
pub const INTERNAL_PREFIX: &str = "web_";

/// Derive the owner identity from a submission filename: the name with a
/// trailing `.Z` archival suffix stripped, if present.
pub fn owner_of(filename: &str) -> &str {
    filename.strip_suffix(".Z").unwrap_or(filename)
}

// ---------------------------------------------------------------------------
// Notify
// ---------------------------------------------------------------------------

/// Status-change message dispatch to a submission's owner.
///
/// Dispatch is best-effort: implementations log transport failures and never
/// fail the grading run over them.
pub trait Notify {
    fn notify(&self, user: &str, subject: &str, body: &str);
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Sends mail through the system `mail` command, addressed as
/// `<user>@<domain>` with the course name prefixed to the subject.
pub struct Mailer {
    course: String,
    domain: String,
}

impl Mailer {
    pub fn new(course: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            domain: domain.into(),
        }
    }
}

impl Notify for Mailer {
    fn notify(&self, user: &str, subject: &str, body: &str) {
        if user.starts_with(INTERNAL_PREFIX) {
            info!(user, subject, "suppressing mail to internal account");
            return;
        }
        let rcpt = format!("{user}@{}", self.domain);
        info!(%rcpt, subject, "sending mail");

        let child = Command::new("mail")
            .arg("-s")
            .arg(format!("{}: {subject}", self.course))
            .arg(&rcpt)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                warn!(%rcpt, "could not spawn mail command: {e}");
                return;
            }
        };
        if let Some(stdin) = child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(body.as_bytes()) {
                warn!(%rcpt, "could not write mail body: {e}");
            }
        }
        drop(child.stdin.take());
        match child.wait() {
            Ok(status) if !status.success() => {
                warn!(%rcpt, %status, "mail command failed");
            }
            Err(e) => warn!(%rcpt, "mail command did not run: {e}"),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
