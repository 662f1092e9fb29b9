use crate::archive::{read_archive_entry, submission_username};
use crate::error::{HandinError, Result};
use crate::groups::GroupDb;
use crate::io::atomic_write;
use crate::scoring::{score, Split};
use crate::types::unix_now;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Allowed team size for scored submissions.
const MIN_MEMBERS: usize = 2;
const MAX_MEMBERS: usize = 3;

// ---------------------------------------------------------------------------
// BoardEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEntry {
    pub name: String,
    /// Unix time of the latest scored submission.
    pub submitted: u64,
    pub accuracy: Split,
    pub rmse: Split,
    /// Lowest quiz RMSE seen across all of this group's submissions.
    /// Records written before best-tracking existed lack the field.
    #[serde(default)]
    pub best_quiz: Option<f64>,
}

impl BoardEntry {
    /// Non-increasing across updates; legacy records fall back to their
    /// latest quiz RMSE.
    pub fn best_quiz_so_far(&self) -> f64 {
        self.best_quiz.unwrap_or(self.rmse.quiz)
    }
}

// ---------------------------------------------------------------------------
// LeaderBoard
// ---------------------------------------------------------------------------

pub struct LeaderBoard {
    path: PathBuf,
    entries: BTreeMap<String, BoardEntry>,
}

impl LeaderBoard {
    /// Load from a YAML file; a missing file is an empty board.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            serde_yaml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_yaml::to_string(&self.entries)?;
        atomic_write(&self.path, data.as_bytes())
    }

    pub fn get(&self, name: &str) -> Option<&BoardEntry> {
        self.entries.get(name)
    }

    /// Record a scored submission, keeping the best quiz RMSE so far.
    pub fn update(&mut self, name: &str, submitted: u64, accuracy: Split, rmse: Split) {
        let best_quiz = match self.entries.get(name) {
            Some(prev) => rmse.quiz.min(prev.best_quiz_so_far()),
            None => rmse.quiz,
        };
        self.entries.insert(
            name.to_string(),
            BoardEntry {
                name: name.to_string(),
                submitted,
                accuracy,
                rmse,
                best_quiz: Some(best_quiz),
            },
        );
    }

    /// Entries ranked by best quiz RMSE, best first.
    pub fn ranked(&self) -> Vec<&BoardEntry> {
        let mut entries: Vec<&BoardEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            a.best_quiz_so_far()
                .partial_cmp(&b.best_quiz_so_far())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }

    /// Render the standings as a self-contained sortable HTML page.
    pub fn render_page(&self) -> String {
        let mut rows = String::new();
        for entry in self.ranked() {
            rows.push_str(&format!(
                "<tr>\n  <td>{}</td>\n  <td>{}</td>\n  <td>{:.2}%</td>\n  <td>{:.4}</td>\n  <td>{:.4}</td>\n</tr>\n",
                entry.name,
                format_time(entry.submitted),
                entry.accuracy.quiz * 100.0,
                entry.rmse.quiz,
                entry.best_quiz_so_far(),
            ));
        }
        format!(
            "{PAGE_HEADER}\n<h1>Project Leaderboard</h1>\n<h4>Updated: {}</h4>\n\
             <p>Click on the header of any column to sort by that column.</p>\n\
             {TABLE_HEADER}{rows}</table>\n{PAGE_FOOTER}",
            format_time(unix_now()),
        )
    }
}

fn format_time(unix: u64) -> String {
    chrono::DateTime::from_timestamp(unix as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| unix.to_string())
}

const PAGE_HEADER: &str = r#"<html>
<head>
  <title>Project Leaderboard</title>
  <META HTTP-EQUIV="expires" CONTENT="0">
  <script src="sorttable.js"></script>
  <style type="text/css">
    body { font-family: helvetica, sans-serif; font-size: 12px; }
    h1 { letter-spacing: -1px; font-size: 25px; }
    h4 { font-size: 14px; font-style: italic; }
    table { text-align: center; font-size: 1.2em; margin: 15px auto; border: 1px solid black; }
    table th { color: white; background-color: #034769; padding: 2px 5px; }
    table td { padding: 2px 5px; }
  </style>
</head>
<body>"#;

const TABLE_HEADER: &str = r#"<table class="sortable">
<tr>
  <th>Group Name</th>
  <th>Time Submitted</th>
  <th>Accuracy</th>
  <th>RMSE</th>
  <th>Best RMSE</th>
</tr>
"#;

const PAGE_FOOTER: &str = "</body>\n</html>\n";

// ---------------------------------------------------------------------------
// submit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub group: String,
    pub accuracy: Split,
    pub rmse: Split,
    pub best_quiz: f64,
}

/// One scored leaderboard submission, start to finish.
///
/// Validation order matters: group membership, team size, and the
/// resubmission throttle are all checked before the archive is opened, so a
/// rejected run leaves both databases untouched.
pub fn submit(
    groups_db: &Path,
    board_db: &Path,
    answers: &Path,
    submission: &Path,
    min_interval_secs: u64,
    page_out: &Path,
) -> Result<SubmitOutcome> {
    let groups = GroupDb::load(groups_db)?;
    let username = submission_username(submission)?;
    let groupname = groups.group_of(username).ok_or_else(|| {
        HandinError::InvalidGroup(format!("username '{username}' has no group"))
    })?;

    let member_count = groups.members(groupname).map_or(0, |m| m.len());
    if !(MIN_MEMBERS..=MAX_MEMBERS).contains(&member_count) {
        return Err(HandinError::InvalidGroup(format!(
            "team '{groupname}' has {member_count} members, which is not in the allowable range"
        )));
    }

    let mut board = LeaderBoard::load(board_db)?;
    let now = unix_now();
    if let Some(previous) = board.get(groupname) {
        let elapsed = now.saturating_sub(previous.submitted);
        if elapsed < min_interval_secs {
            return Err(HandinError::Throttled {
                elapsed_secs: elapsed,
                min_secs: min_interval_secs,
            });
        }
    }

    let predictions = read_archive_entry(submission, "submit.txt")?;
    let truths = std::fs::read_to_string(answers)?;
    let report = score(&predictions, &truths)?;

    board.update(groupname, now, report.accuracy, report.rmse);
    board.save()?;
    atomic_write(page_out, board.render_page().as_bytes())?;
    info!(group = groupname, "leaderboard updated");

    let best_quiz = board
        .get(groupname)
        .map(BoardEntry::best_quiz_so_far)
        .unwrap_or(report.rmse.quiz);
    Ok(SubmitOutcome {
        group: groupname.to_string(),
        accuracy: report.accuracy,
        rmse: report.rmse,
        best_quiz,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn split(test: f64, quiz: f64) -> Split {
        Split { test, quiz }
    }

    fn board(dir: &TempDir) -> LeaderBoard {
        LeaderBoard::load(&dir.path().join("leaderboard.db")).unwrap()
    }

    #[test]
    fn best_quiz_is_monotonically_non_increasing() {
        let dir = TempDir::new().unwrap();
        let mut board = board(&dir);
        let quiz_rmses = [0.9, 0.5, 0.7, 0.6, 0.4, 0.8];
        for (i, rmse) in quiz_rmses.iter().enumerate() {
            board.update("team-rocket", i as u64, split(0.5, 0.5), split(1.0, *rmse));
            let best = board.get("team-rocket").unwrap().best_quiz_so_far();
            let running_min = quiz_rmses[..=i].iter().cloned().fold(f64::MAX, f64::min);
            assert_eq!(best, running_min);
        }
    }

    #[test]
    fn latest_metrics_replace_but_best_persists() {
        let dir = TempDir::new().unwrap();
        let mut board = board(&dir);
        board.update("team-rocket", 1, split(0.9, 0.8), split(0.2, 0.3));
        board.update("team-rocket", 2, split(0.5, 0.4), split(0.9, 0.9));
        let entry = board.get("team-rocket").unwrap();
        assert_eq!(entry.rmse.quiz, 0.9);
        assert_eq!(entry.best_quiz_so_far(), 0.3);
        assert_eq!(entry.submitted, 2);
    }

    #[test]
    fn legacy_record_without_best_falls_back_to_quiz_rmse() {
        let entry = BoardEntry {
            name: "old-team".into(),
            submitted: 1,
            accuracy: split(0.5, 0.5),
            rmse: split(0.4, 0.6),
            best_quiz: None,
        };
        assert_eq!(entry.best_quiz_so_far(), 0.6);
    }

    #[test]
    fn legacy_record_yaml_deserializes() {
        let yaml = r#"
old-team:
  name: old-team
  submitted: 100
  accuracy: { test: 0.5, quiz: 0.6 }
  rmse: { test: 0.4, quiz: 0.7 }
"#;
        let entries: BTreeMap<String, BoardEntry> = serde_yaml::from_str(yaml).unwrap();
        assert!(entries["old-team"].best_quiz.is_none());
    }

    #[test]
    fn ranking_is_by_best_quiz_rmse_ascending() {
        let dir = TempDir::new().unwrap();
        let mut board = board(&dir);
        board.update("slow-team", 1, split(0.5, 0.5), split(1.0, 0.9));
        board.update("fast-team", 1, split(0.5, 0.5), split(1.0, 0.1));
        board.update("mid-team", 1, split(0.5, 0.5), split(1.0, 0.5));
        let names: Vec<&str> = board.ranked().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["fast-team", "mid-team", "slow-team"]);
    }

    #[test]
    fn page_lists_groups_in_rank_order() {
        let dir = TempDir::new().unwrap();
        let mut board = board(&dir);
        board.update("beta", 1, split(0.5, 0.75), split(1.0, 0.5));
        board.update("alpha", 1, split(0.5, 0.5), split(1.0, 0.25));
        let page = board.render_page();
        let alpha = page.find("<td>alpha</td>").unwrap();
        let beta = page.find("<td>beta</td>").unwrap();
        assert!(alpha < beta);
        assert!(page.contains("75.00%"));
        assert!(page.contains("0.2500"));
    }

    struct SubmitFixture {
        dir: TempDir,
        groups_db: PathBuf,
        board_db: PathBuf,
        answers: PathBuf,
        page: PathBuf,
    }

    impl SubmitFixture {
        fn new() -> SubmitFixture {
            let dir = TempDir::new().unwrap();
            let groups_db = dir.path().join("groups.db");
            let board_db = dir.path().join("leaderboard.db");
            let answers = dir.path().join("answers.txt");
            let page = dir.path().join("leaderboard.html");

            let mut groups = GroupDb::default();
            groups.assign("alice", "team-rocket").unwrap();
            groups.assign("bob", "team-rocket").unwrap();
            groups.assign("solo", "loners").unwrap();
            groups.save(&groups_db).unwrap();

            std::fs::write(&answers, "1.0 0\n2.0 0\n3.0 1\n4.0 1\n").unwrap();
            SubmitFixture {
                dir,
                groups_db,
                board_db,
                answers,
                page,
            }
        }

        fn tar(&self, name: &str, submit_lines: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            let file = std::fs::File::create(&path).unwrap();
            let mut builder = tar::Builder::new(file);
            let mut header = tar::Header::new_gnu();
            header.set_size(submit_lines.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "submit.txt", submit_lines.as_bytes())
                .unwrap();
            builder.finish().unwrap();
            path
        }

        fn submit(&self, tar: &Path, min_interval: u64) -> Result<SubmitOutcome> {
            submit(
                &self.groups_db,
                &self.board_db,
                &self.answers,
                tar,
                min_interval,
                &self.page,
            )
        }
    }

    #[test]
    fn submit_scores_and_publishes() {
        let fx = SubmitFixture::new();
        let tar = fx.tar("alice.tar", "1.0\n2.0\n3.0\n4.0\n");
        let outcome = fx.submit(&tar, 0).unwrap();
        assert_eq!(outcome.group, "team-rocket");
        assert_eq!(outcome.rmse.quiz, 0.0);
        assert_eq!(outcome.best_quiz, 0.0);

        let board = LeaderBoard::load(&fx.board_db).unwrap();
        assert!(board.get("team-rocket").is_some());
        assert!(fx.page.exists());
    }

    #[test]
    fn throttled_resubmission_mutates_nothing() {
        let fx = SubmitFixture::new();
        let tar = fx.tar("alice.tar", "1.0\n2.0\n3.0\n4.0\n");
        fx.submit(&tar, 0).unwrap();
        let board_before = std::fs::read_to_string(&fx.board_db).unwrap();

        // Second submission arrives well inside the minimum interval.
        let tar = fx.tar("bob.tar", "0.0\n0.0\n0.0\n0.0\n");
        let err = fx.submit(&tar, 5 * 60 * 60).unwrap_err();
        assert!(matches!(err, HandinError::Throttled { .. }));
        assert_eq!(std::fs::read_to_string(&fx.board_db).unwrap(), board_before);
    }

    #[test]
    fn user_without_group_rejected() {
        let fx = SubmitFixture::new();
        let tar = fx.tar("mallory.tar", "1.0\n2.0\n3.0\n4.0\n");
        let err = fx.submit(&tar, 0).unwrap_err();
        assert!(err.to_string().contains("has no group"));
        assert!(!fx.board_db.exists());
    }

    #[test]
    fn undersized_team_rejected() {
        let fx = SubmitFixture::new();
        let tar = fx.tar("solo.tar", "1.0\n2.0\n3.0\n4.0\n");
        let err = fx.submit(&tar, 0).unwrap_err();
        assert!(err.to_string().contains("allowable range"));
    }

    #[test]
    fn wrong_line_count_rejected_without_mutation() {
        let fx = SubmitFixture::new();
        let tar = fx.tar("alice.tar", "1.0\n2.0\n");
        let err = fx.submit(&tar, 0).unwrap_err();
        assert!(matches!(
            err,
            HandinError::LineCount {
                expected: 4,
                actual: 2
            }
        ));
        assert!(!fx.board_db.exists());
    }

    #[test]
    fn board_roundtrips_through_yaml() {
        let dir = TempDir::new().unwrap();
        let mut board = board(&dir);
        board.update("team-rocket", 42, split(0.9, 0.8), split(0.2, 0.3));
        board.save().unwrap();

        let reloaded = LeaderBoard::load(&dir.path().join("leaderboard.db")).unwrap();
        let entry = reloaded.get("team-rocket").unwrap();
        assert_eq!(entry.submitted, 42);
        assert_eq!(entry.best_quiz, Some(0.3));
    }
}
