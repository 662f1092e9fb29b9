use crate::archive::{read_archive_entry, submission_username};
use crate::error::{HandinError, Result};
use crate::io::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// GroupDb
// ---------------------------------------------------------------------------

/// Membership store: a user belongs to at most one group at a time, and
/// `groups` mirrors `users` exactly (every assignment appears in both maps).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GroupDb {
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    #[serde(default)]
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

impl GroupDb {
    /// Load from a YAML file; a missing file is an empty database.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(GroupDb::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    pub fn group_of(&self, user: &str) -> Option<&str> {
        self.users.get(user).map(String::as_str)
    }

    pub fn members(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(group)
    }

    /// Move `username` into `groupname`, removing them from their previous
    /// group's member set first. A group name colliding with a known
    /// username is rejected; a user recorded in `users` but absent from
    /// their group's member set means the database is corrupt.
    pub fn assign(&mut self, username: &str, groupname: &str) -> Result<()> {
        if self.users.contains_key(groupname) {
            return Err(HandinError::InvalidGroup(format!(
                "invalid groupname '{groupname}'; this belongs to a username"
            )));
        }

        if let Some(previous) = self.users.get(username).cloned() {
            let removed = self
                .groups
                .get_mut(&previous)
                .is_some_and(|members| members.remove(username));
            if !removed {
                return Err(HandinError::InvalidGroup(format!(
                    "database is corrupt: user '{username}' has no group"
                )));
            }
        }

        self.groups
            .entry(groupname.to_string())
            .or_default()
            .insert(username.to_string());
        self.users
            .insert(username.to_string(), groupname.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// register
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RegisterOutcome {
    pub username: String,
    pub group: String,
    pub members: Vec<String>,
}

/// Register the submitting user into the group named by their submission.
///
/// The tar must contain `group.txt` with exactly one line: the group name.
/// On success the database is rewritten atomically.
pub fn register(db_path: &Path, submission: &Path) -> Result<RegisterOutcome> {
    let username = submission_username(submission)?.to_string();

    let contents = read_archive_entry(submission, "group.txt")?;
    let lines: Vec<&str> = contents.lines().collect();
    if lines.len() != 1 {
        return Err(HandinError::LineCount {
            expected: 1,
            actual: lines.len(),
        });
    }
    let groupname = lines[0].trim();
    if groupname.is_empty() {
        return Err(HandinError::InvalidGroup("group name is empty".into()));
    }

    let mut db = GroupDb::load(db_path)?;
    db.assign(&username, groupname)?;
    db.save(db_path)?;

    let members = db
        .members(groupname)
        .map(|m| m.iter().cloned().collect())
        .unwrap_or_default();
    Ok(RegisterOutcome {
        username,
        group: groupname.to_string(),
        members,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
