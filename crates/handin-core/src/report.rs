use crate::config::{ProjectConfig, WebsiteConfig};
use crate::error::Result;
use crate::io::atomic_write;
use crate::ledger::{Ledger, SubmissionRecord};
use crate::types::Status;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Renders ledger state into the published status site: one overview page
/// and one detail page per project. Rendering is a pure function of the
/// ledger — re-rendering identical state produces identical output modulo
/// the "Updated:" timestamp.
pub struct Reporter {
    course: String,
    webroot: PathBuf,
    header: Option<PathBuf>,
    footer: Option<PathBuf>,
}

impl Reporter {
    pub fn new(course: impl Into<String>, website: &WebsiteConfig) -> Self {
        Self {
            course: course.into(),
            webroot: website.path.clone(),
            header: website.header.clone(),
            footer: website.footer.clone(),
        }
    }

    /// Write `index.html` plus one `<project>.html` per configured project.
    pub fn publish(&self, projects: &[ProjectConfig], ledger: &Ledger) -> Result<()> {
        let header = self.fragment(self.header.as_deref());
        let footer = self.fragment(self.footer.as_deref());
        let title = self.title_html();

        let index = format!(
            "{header}{title}{}{footer}",
            render_index(projects, ledger)
        );
        atomic_write(&self.webroot.join("index.html"), index.as_bytes())?;

        for project in projects {
            let body = render_project(&project.name, ledger.records(&project.name));
            let page = format!("{header}{title}{body}{footer}");
            atomic_write(
                &self.webroot.join(format!("{}.html", project.name)),
                page.as_bytes(),
            )?;
        }
        Ok(())
    }

    fn fragment(&self, path: Option<&Path>) -> String {
        path.and_then(|p| std::fs::read_to_string(p).ok())
            .unwrap_or_default()
    }

    fn title_html(&self) -> String {
        format!(
            "<h1>Submission monitor: {}</h1>\n<h4>Updated: {}</h4>\n",
            self.course,
            format_time(crate::types::unix_now())
        )
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// The overview table: per project, the submission count and aggregate
/// counts per status class. `failed(*)`, `killed`, and `file_too_large` all
/// count into the failed column.
pub fn render_index(projects: &[ProjectConfig], ledger: &Ledger) -> String {
    let mut out = String::from("<h2>Project Overviews</h2>\n<table>\n");
    push_row(
        &mut out,
        "th",
        &[
            &"Project",
            &"Submissions",
            &"Queued",
            &"Completed",
            &"Running",
            &"Failed",
        ],
    );
    for project in projects {
        let all: Vec<&SubmissionRecord> = ledger
            .records(&project.name)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        let count = |status: Status| all.iter().filter(|r| r.status == status).count();
        let link = format!("<a href=\"{name}.html\">{name}</a>", name = project.name);
        let failed = all.iter().filter(|r| r.status.is_failure()).count();
        push_row(
            &mut out,
            "td",
            &[
                &link,
                &all.len(),
                &count(Status::Queued),
                &count(Status::Completed),
                &count(Status::Running),
                &failed,
            ],
        );
    }
    out.push_str("</table>\n");
    out
}

fn push_row(out: &mut String, tag: &str, cells: &[&dyn std::fmt::Display]) {
    out.push_str("<tr>\n");
    for cell in cells {
        out.push_str(&format!("  <{tag}>{cell}</{tag}>\n"));
    }
    out.push_str("</tr>\n");
}

/// The per-project detail table: every submission with size, submission
/// time, and status with last-updated time, sorted by name.
pub fn render_project(
    project: &str,
    records: Option<&std::collections::BTreeMap<String, SubmissionRecord>>,
) -> String {
    let mut out = format!(
        "<p><a href='index.html'>Back to Overview</a></p>\n<h2>Project Submissions: {project}</h2>\n<table>\n"
    );
    push_row(&mut out, "th", &[&"Name", &"Size", &"Time Submitted", &"Status"]);
    if let Some(records) = records {
        for record in records.values() {
            let size = format!("{:.4} MB", record.size_mb());
            let status = format!("{} ({})", record.status, format_time(record.last_updated));
            push_row(
                &mut out,
                "td",
                &[&record.name, &size, &format_time(record.mtime), &status],
            );
        }
    }
    out.push_str("</table>\n");
    out
}

fn format_time(unix: u64) -> String {
    chrono::DateTime::from_timestamp(unix as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| unix.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
