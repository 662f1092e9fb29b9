use crate::error::{HandinError, Result};
use std::io::Read;
use std::path::Path;

/// Derive the submitting username from a submission path: the file name with
/// its extension removed (`/incoming/alice.tar` → `alice`).
pub fn submission_username(path: &Path) -> Result<&str> {
    path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
        HandinError::ArchiveFormat(format!(
            "cannot derive a username from {}",
            path.display()
        ))
    })
}

/// Read the contents of one expected text file out of a tar archive.
///
/// The entry may be stored with or without a leading directory component;
/// matching is on the trailing path component.
pub fn read_archive_entry(archive_path: &Path, entry_name: &str) -> Result<String> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = tar::Archive::new(file);
    let entries = archive
        .entries()
        .map_err(|e| bad_archive(archive_path, &e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| bad_archive(archive_path, &e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p.as_ref() == Path::new(entry_name) || p.ends_with(entry_name))
            .unwrap_or(false);
        if matches {
            let mut contents = String::new();
            entry
                .read_to_string(&mut contents)
                .map_err(|e| bad_archive(archive_path, &e.to_string()))?;
            return Ok(contents);
        }
    }
    Err(HandinError::ArchiveFormat(format!(
        "submission does not contain {entry_name}"
    )))
}

fn bad_archive(path: &Path, detail: &str) -> HandinError {
    HandinError::ArchiveFormat(format!("{}: {detail}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
