use crate::error::{HandinError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

/// One monitored grading pipeline. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Grading executable, invoked as `action <project> <filename>`.
    pub action: PathBuf,
    /// Admission limit; submissions over `size_limit_mb * 1e6` bytes are
    /// rejected as file_too_large without queueing.
    pub size_limit_mb: f64,
    /// Wall-clock budget for one grading run.
    pub time_limit_secs: f64,
}

impl ProjectConfig {
    pub fn size_limit_bytes(&self) -> u64 {
        (self.size_limit_mb * 1e6) as u64
    }
}

// ---------------------------------------------------------------------------
// StoreBackend
// ---------------------------------------------------------------------------

/// Which submission store implementation the monitor talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackend {
    Local,
    Remote {
        host: String,
        username: String,
        key_file: PathBuf,
    },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Local
    }
}

// ---------------------------------------------------------------------------
// WebsiteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteConfig {
    /// Directory the rendered status pages are published into.
    pub path: PathBuf,
    /// Optional HTML fragment prepended to every page.
    #[serde(default)]
    pub header: Option<PathBuf>,
    /// Optional HTML fragment appended to every page.
    #[serde(default)]
    pub footer: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// MonitorConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Course identity; prefixes mail subjects and titles the status pages.
    pub course: String,
    /// Directory containing one subdirectory per monitored project.
    pub target_dir: PathBuf,
    #[serde(default)]
    pub store: StoreBackend,
    /// Where per-project ledger files live.
    pub db_dir: PathBuf,
    /// Where captured stdout/stderr of grading runs live.
    pub log_dir: PathBuf,
    pub website: WebsiteConfig,
    /// Owner notifications go to `<user>@<mail_domain>`.
    pub mail_domain: String,
    pub projects: Vec<ProjectConfig>,
}

impl MonitorConfig {
    /// Parse and structurally validate a monitor configuration.
    ///
    /// An empty project list and duplicate project names are both hard
    /// errors: a duplicate means two conflicting grading pipelines would
    /// compete for the same store directory and ledger file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HandinError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: MonitorConfig = serde_yaml::from_str(&data)?;

        if cfg.projects.is_empty() {
            return Err(HandinError::Config(
                "must have at least one project to monitor".into(),
            ));
        }
        let mut seen = HashSet::new();
        for project in &cfg.projects {
            if !seen.insert(project.name.as_str()) {
                return Err(HandinError::Config(format!(
                    "duplicate project name '{}'",
                    project.name
                )));
            }
        }
        Ok(cfg)
    }

    /// Non-fatal sanity checks, reported but never blocking startup.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for project in &self.projects {
            if project.size_limit_mb <= 0.0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "project '{}' has size_limit_mb={} — every submission will be rejected",
                        project.name, project.size_limit_mb
                    ),
                });
            }
            if project.time_limit_secs <= 0.0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "project '{}' has time_limit_secs={} — every run will be killed",
                        project.name, project.time_limit_secs
                    ),
                });
            }
            if !project.action.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "project '{}' action does not exist locally: {}",
                        project.name,
                        project.action.display()
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("monitor.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const MINIMAL: &str = r#"
course: cis520
target_dir: /srv/submit
db_dir: db
log_dir: logs
website:
  path: www
mail_domain: example.edu
projects:
  - name: project1
    action: /srv/grade.sh
    size_limit_mb: 5.0
    time_limit_secs: 60
"#;

    #[test]
    fn minimal_config_loads() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL);
        let cfg = MonitorConfig::load(&path).unwrap();
        assert_eq!(cfg.course, "cis520");
        assert_eq!(cfg.store, StoreBackend::Local);
        assert_eq!(cfg.projects.len(), 1);
        assert_eq!(cfg.projects[0].size_limit_bytes(), 5_000_000);
        assert!(cfg.website.header.is_none());
    }

    #[test]
    fn remote_store_tagged() {
        let yaml = r#"
type: remote
host: submit.example.edu
username: grader
key_file: /home/grader/.ssh/id_rsa
"#;
        let store: StoreBackend = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(store, StoreBackend::Remote { .. }));

        let out = serde_yaml::to_string(&store).unwrap();
        assert!(out.contains("type: remote"));
    }

    #[test]
    fn missing_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = MonitorConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, HandinError::Config(_)));
    }

    #[test]
    fn empty_project_list_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
course: cis520
target_dir: /srv/submit
db_dir: db
log_dir: logs
website:
  path: www
mail_domain: example.edu
projects: []
"#,
        );
        assert!(MonitorConfig::load(&path).is_err());
    }

    #[test]
    fn duplicate_project_names_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
course: cis520
target_dir: /srv/submit
db_dir: db
log_dir: logs
website:
  path: www
mail_domain: example.edu
projects:
  - name: project1
    action: /srv/grade.sh
    size_limit_mb: 5.0
    time_limit_secs: 60
  - name: project1
    action: /srv/other.sh
    size_limit_mb: 1.0
    time_limit_secs: 10
"#,
        );
        let err = MonitorConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate project name"));
    }

    #[test]
    fn validate_flags_nonpositive_limits() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
course: cis520
target_dir: /srv/submit
db_dir: db
log_dir: logs
website:
  path: www
mail_domain: example.edu
projects:
  - name: project1
    action: /srv/grade.sh
    size_limit_mb: 0.0
    time_limit_secs: 0.0
"#,
        );
        let cfg = MonitorConfig::load(&path).unwrap();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("size_limit_mb")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("time_limit_secs")));
    }

    #[test]
    fn validate_existing_action_no_warning() {
        let dir = TempDir::new().unwrap();
        let action = dir.path().join("grade.sh");
        std::fs::write(&action, "#!/bin/sh\nexit 0\n").unwrap();
        let body = format!(
            r#"
course: cis520
target_dir: /srv/submit
db_dir: db
log_dir: logs
website:
  path: www
mail_domain: example.edu
projects:
  - name: project1
    action: {}
    size_limit_mb: 5.0
    time_limit_secs: 60
"#,
            action.display()
        );
        let path = write_config(&dir, &body);
        let cfg = MonitorConfig::load(&path).unwrap();
        assert!(cfg.validate().is_empty());
    }
}
