use crate::error::Result;
use crate::io::atomic_write;
use crate::types::{unix_now, Status};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// SubmissionRecord
// ---------------------------------------------------------------------------

/// Latest known state of one submission, keyed by `(project, filename)`.
///
/// `mtime` is the source-of-truth timestamp of the submitted file and only
/// ever increases across updates for the same filename; `last_updated` is the
/// wall-clock time of the last status change.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub name: String,
    pub size_bytes: u64,
    pub mtime: u64,
    pub last_updated: u64,
    pub status: Status,
}

impl SubmissionRecord {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / 1e6
    }

    /// Serialize to the durable one-line form:
    /// `name,size,updated,timestamp,status`, size in megabytes with exactly
    /// four fraction digits, timestamps as decimal unix seconds. Fields must
    /// not contain commas; the format has no escaping.
    fn to_line(&self) -> String {
        format!(
            "{},{:.4},{},{},{}",
            self.name,
            self.size_mb(),
            self.last_updated,
            self.mtime,
            self.status
        )
    }

    fn parse_line(line: &str) -> Option<SubmissionRecord> {
        let mut fields = line.splitn(5, ',');
        let name = fields.next()?;
        let size_mb: f64 = fields.next()?.parse().ok()?;
        let last_updated: u64 = fields.next()?.parse().ok()?;
        let mtime: u64 = fields.next()?.parse().ok()?;
        let status: Status = fields.next()?.parse().ok()?;
        if name.is_empty() {
            return None;
        }
        Some(SubmissionRecord {
            name: name.to_string(),
            size_bytes: (size_mb * 1e6).round() as u64,
            mtime,
            last_updated,
            status,
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Durable per-project store of submission records.
///
/// Exactly one record exists per `(project, filename)` pair. The ledger is a
/// mapping, not a sequence: flush order is stable (by filename) but carries
/// no meaning.
pub struct Ledger {
    course: String,
    db_dir: PathBuf,
    data: HashMap<String, BTreeMap<String, SubmissionRecord>>,
}

impl Ledger {
    pub fn new(course: impl Into<String>, db_dir: impl Into<PathBuf>) -> Self {
        Self {
            course: course.into(),
            db_dir: db_dir.into(),
            data: HashMap::new(),
        }
    }

    fn db_path(&self, project: &str) -> PathBuf {
        self.db_dir.join(format!("{}.{}", self.course, project))
    }

    /// Replace in-memory state for a project from durable storage. A missing
    /// file is an empty project; malformed lines are skipped with a warning.
    pub fn load(&mut self, project: &str) -> Result<()> {
        let path = self.db_path(project);
        let records = self.data.entry(project.to_string()).or_default();
        records.clear();

        if !path.exists() {
            return Ok(());
        }
        info!(path = %path.display(), "reading ledger");
        let data = std::fs::read_to_string(&path)?;
        for line in data.lines() {
            if line.is_empty() {
                continue;
            }
            match SubmissionRecord::parse_line(line) {
                Some(rec) => {
                    records.insert(rec.name.clone(), rec);
                }
                None => {
                    warn!(project, line, "skipping malformed ledger record");
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, project: &str, filename: &str) -> Option<&SubmissionRecord> {
        self.data.get(project)?.get(filename)
    }

    /// Timestamp of the last recorded event for this filename, or epoch zero
    /// for a submission never seen before.
    pub fn last_known_mtime(&self, project: &str, filename: &str) -> u64 {
        self.get(project, filename).map(|r| r.mtime).unwrap_or(0)
    }

    /// Insert or replace the record for `(project, filename)`, stamping
    /// `last_updated` with the current wall-clock time.
    pub fn upsert(
        &mut self,
        project: &str,
        filename: &str,
        status: Status,
        size_bytes: u64,
        mtime: u64,
    ) {
        let record = SubmissionRecord {
            name: filename.to_string(),
            size_bytes,
            mtime,
            last_updated: unix_now(),
            status,
        };
        self.data
            .entry(project.to_string())
            .or_default()
            .insert(filename.to_string(), record);
    }

    /// All records for a project, keyed by filename.
    pub fn records(&self, project: &str) -> Option<&BTreeMap<String, SubmissionRecord>> {
        self.data.get(project)
    }

    /// Serialize all records for a project to durable storage, one record per
    /// line. Written atomically: a crash mid-flush leaves the previous file
    /// intact.
    pub fn flush(&self, project: &str) -> Result<()> {
        let mut out = String::new();
        if let Some(records) = self.data.get(project) {
            for record in records.values() {
                out.push_str(&record.to_line());
                out.push('\n');
            }
        }
        let path = self.db_path(project);
        info!(path = %path.display(), "updating ledger");
        atomic_write(&path, out.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> Ledger {
        Ledger::new("cis520", dir.path())
    }

    #[test]
    fn record_line_form() {
        let rec = SubmissionRecord {
            name: "alice.tar".into(),
            size_bytes: 3_000_000,
            mtime: 1_700_000_000,
            last_updated: 1_700_000_100,
            status: Status::Completed,
        };
        assert_eq!(
            rec.to_line(),
            "alice.tar,3.0000,1700000100,1700000000,completed"
        );
        assert_eq!(SubmissionRecord::parse_line(&rec.to_line()), Some(rec));
    }

    #[test]
    fn flush_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        ledger.upsert("project1", "alice.tar", Status::Completed, 3_141_593, 100);
        ledger.upsert("project1", "bob.tar", Status::Failed(2), 8_000_000, 200);
        ledger.upsert("project1", "web_test.tar", Status::FileTooLarge, 9_999_999, 300);
        ledger.flush("project1").unwrap();

        let first = std::fs::read_to_string(dir.path().join("cis520.project1")).unwrap();

        let mut reloaded = Ledger::new("cis520", dir.path());
        reloaded.load("project1").unwrap();
        for name in ["alice.tar", "bob.tar", "web_test.tar"] {
            assert_eq!(
                reloaded.get("project1", name),
                ledger.get("project1", name),
                "record mismatch for {name}"
            );
        }

        // Flushing the reloaded state reproduces the file byte for byte.
        reloaded.flush("project1").unwrap();
        let second = std::fs::read_to_string(dir.path().join("cis520.project1")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        ledger.load("project1").unwrap();
        assert!(ledger.records("project1").unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("cis520.project1"),
            "alice.tar,3.0000,1700000100,1700000000,completed\n\
             this is not a record\n\
             bob.tar,1.0000,5,4,bogus_status\n\
             carol.tar,2.0000,10,9,queued\n",
        )
        .unwrap();
        let mut ledger = ledger(&dir);
        ledger.load("project1").unwrap();
        let records = ledger.records("project1").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.contains_key("alice.tar"));
        assert!(records.contains_key("carol.tar"));
    }

    #[test]
    fn load_replaces_previous_state() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        ledger.upsert("project1", "stale.tar", Status::Queued, 1, 1);
        ledger.load("project1").unwrap();
        assert!(ledger.get("project1", "stale.tar").is_none());
    }

    #[test]
    fn upsert_replaces_and_stamps() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        ledger.upsert("project1", "alice.tar", Status::Queued, 100, 10);
        ledger.upsert("project1", "alice.tar", Status::Running, 100, 10);
        let rec = ledger.get("project1", "alice.tar").unwrap();
        assert_eq!(rec.status, Status::Running);
        assert_eq!(ledger.records("project1").unwrap().len(), 1);
        assert!(rec.last_updated > 0);
    }

    #[test]
    fn last_known_mtime_defaults_to_epoch() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        assert_eq!(ledger.last_known_mtime("project1", "new.tar"), 0);
        ledger.upsert("project1", "new.tar", Status::Queued, 1, 42);
        assert_eq!(ledger.last_known_mtime("project1", "new.tar"), 42);
    }

    #[test]
    fn size_representation_is_mb_with_four_digits() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        ledger.upsert("project1", "a.tar", Status::Queued, 1_234_567, 1);
        ledger.flush("project1").unwrap();
        let data = std::fs::read_to_string(dir.path().join("cis520.project1")).unwrap();
        assert!(data.contains(",1.2346,"), "got: {data}");
    }
}
