use crate::config::{MonitorConfig, ProjectConfig};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::notify::{owner_of, Notify};
use crate::report::Reporter;
use crate::store::{StoreEntry, SubmissionStore};
use crate::supervisor::{log_paths, remove_stale_logs, run_action, Outcome, RunSpec};
use crate::types::Status;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A queued grading invocation for one admitted submission. Created by
/// discovery, consumed exactly once by the drain; the outcome lives in the
/// ledger, not here.
#[derive(Debug, Clone)]
pub struct Action {
    pub project: ProjectConfig,
    pub entry: StoreEntry,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// One monitoring pass over the submission store: load ledgers, discover and
/// admit new submissions, drain the action queue sequentially, flush.
///
/// Single-threaded by design — grading workloads are resource-heavy, and
/// serializing them avoids oversubscription. Every ledger mutation
/// republishes the status site before anything else happens.
pub struct Monitor<'a, S: SubmissionStore> {
    config: MonitorConfig,
    store: S,
    ledger: Ledger,
    reporter: Reporter,
    notifier: &'a dyn Notify,
    queue: Vec<Action>,
}

impl<'a, S: SubmissionStore> Monitor<'a, S> {
    pub fn new(config: MonitorConfig, store: S, notifier: &'a dyn Notify) -> Self {
        let ledger = Ledger::new(&config.course, &config.db_dir);
        let reporter = Reporter::new(&config.course, &config.website);
        Self {
            config,
            store,
            ledger,
            reporter,
            notifier,
            queue: Vec::new(),
        }
    }

    /// Run one full pass: load → discover → execute → flush.
    pub fn run(&mut self) -> Result<()> {
        self.load_all()?;
        self.discover()?;
        self.execute_actions();
        self.flush_all()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // -----------------------------------------------------------------------
    // Ledger lifecycle
    // -----------------------------------------------------------------------

    fn load_all(&mut self) -> Result<()> {
        for project in &self.config.projects.clone() {
            self.ledger.load(&project.name)?;
        }
        self.publish_report();
        Ok(())
    }

    fn flush_all(&self) -> Result<()> {
        for project in &self.config.projects {
            self.ledger.flush(&project.name)?;
        }
        Ok(())
    }

    /// The single mutation path: every upsert is immediately followed by a
    /// status-site refresh, so the report never lags the ledger.
    fn record(&mut self, project: &str, filename: &str, status: Status, size: u64, mtime: u64) {
        self.ledger.upsert(project, filename, status, size, mtime);
        self.publish_report();
    }

    fn publish_report(&self) {
        if let Err(e) = self
            .reporter
            .publish(&self.config.projects, &self.ledger)
        {
            warn!("could not publish status site: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Discovery & admission
    // -----------------------------------------------------------------------

    /// Compare the store listing against the ledger and admit new work.
    ///
    /// A submission is new when its mtime is strictly newer than the last
    /// recorded one (epoch zero when never seen). Oversize submissions are
    /// marked terminal and never enqueued; repeated passes over unchanged
    /// submissions are no-ops.
    pub fn discover(&mut self) -> Result<()> {
        let names = self.store.list_names(&self.config.target_dir)?;
        let present: HashSet<&str> = names.iter().map(String::as_str).collect();

        let projects = self.config.projects.clone();
        let active: Vec<&ProjectConfig> = projects
            .iter()
            .filter(|p| present.contains(p.name.as_str()))
            .collect();
        info!(
            "found {} active projects: {}",
            active.len(),
            active
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        );

        for project in active {
            let project_dir = self.config.target_dir.join(&project.name);
            let entries = self.store.list(&project_dir)?;
            info!(project = %project.name, "found {} submissions", entries.len());

            for entry in entries {
                let last_known = self.ledger.last_known_mtime(&project.name, &entry.name);
                if entry.mtime <= last_known {
                    continue;
                }
                if entry.size > project.size_limit_bytes() {
                    self.record(
                        &project.name,
                        &entry.name,
                        Status::FileTooLarge,
                        entry.size,
                        entry.mtime,
                    );
                    self.send_failure(&project.name, &entry.name, None);
                } else {
                    self.record(
                        &project.name,
                        &entry.name,
                        Status::Queued,
                        entry.size,
                        entry.mtime,
                    );
                    self.queue.push(Action {
                        project: project.clone(),
                        entry,
                    });
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Drain the queue strictly sequentially, in admission order.
    pub fn execute_actions(&mut self) {
        info!("{} actions remain in queue", self.queue.len());
        self.send_received_notices();

        let queue = std::mem::take(&mut self.queue);
        for action in queue {
            self.execute_one(&action);
        }
    }

    fn send_received_notices(&self) {
        let total = self.queue.len();
        for (i, action) in self.queue.iter().enumerate() {
            let user = owner_of(&action.entry.name);
            let body = format!(
                "Dear {user},\n\n\
                 Your submission to project {} has been received.\n\
                 There are {} submissions ahead of you in line.\n",
                action.project.name,
                total - i - 1
            );
            self.notifier.notify(user, "Submission Received", &body);
        }
    }

    fn execute_one(&mut self, action: &Action) {
        let project = &action.project;
        let filename = &action.entry.name;
        let (stdout_path, stderr_path) = log_paths(&self.config.log_dir, &project.name, filename);
        remove_stale_logs(&stdout_path, &stderr_path);

        self.record(
            &project.name,
            filename,
            Status::Running,
            action.entry.size,
            action.entry.mtime,
        );

        let spec = RunSpec {
            action: &project.action,
            project: &project.name,
            filename,
            time_limit: Duration::from_secs_f64(project.time_limit_secs.max(0.0)),
            stdout_path: &stdout_path,
            stderr_path: &stderr_path,
        };
        let status = match run_action(&spec) {
            Ok(Outcome::Completed) => Status::Completed,
            Ok(Outcome::Failed(code)) => Status::Failed(code),
            Ok(Outcome::Killed) => Status::Killed,
            Err(e) => {
                warn!(
                    project = %project.name,
                    %filename,
                    "action could not run: {e}"
                );
                Status::Failed(-1)
            }
        };

        self.record(
            &project.name,
            filename,
            status,
            action.entry.size,
            action.entry.mtime,
        );

        if status != Status::Completed {
            // Killed runs produce arbitrarily large truncated logs; skip
            // attaching those.
            let logs = (status != Status::Killed)
                .then_some((stdout_path.as_path(), stderr_path.as_path()));
            self.send_failure(&project.name, filename, logs);
        }
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    fn send_failure(&self, project: &str, filename: &str, logs: Option<(&Path, &Path)>) {
        let user = owner_of(filename);
        let mut body = format!(
            "Dear {user},\n\n\
             Your submission to project {project} has failed to execute.\n"
        );
        if let Some(record) = self.ledger.get(project, filename) {
            body.push_str(&format!("The reason: {}\n", record.status));
            body.push_str(
                "Please forward this message to the course staff if you don't \
                 understand the problem.\n",
            );
            body.push_str(&format!(
                "\n---------------- RECORD:\n\
                 name: {}\nsize: {:.4} MB\nsubmitted: {}\nupdated: {}\nstatus: {}\n",
                record.name,
                record.size_mb(),
                record.mtime,
                record.last_updated,
                record.status
            ));
        }
        if let Some((stdout_path, stderr_path)) = logs {
            let read = |p: &Path| std::fs::read_to_string(p).unwrap_or_default();
            body.push_str(&format!("\n---------------- STDOUT:\n{}", read(stdout_path)));
            body.push_str(&format!("\n---------------- STDERR:\n{}", read(stderr_path)));
        }
        self.notifier.notify(user, "Submission Failure", &body);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
