use std::fs;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::archive::read_summary;
use crate::diff::{ChangeKind, Diff};
use crate::error::{IoResultExt, Result};
use crate::repo::Repo;
use crate::version::{sort_versions, Version};

/// a local pin for log output
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub version: Version,
    pub message: String,
    pub diffs: Vec<Diff>,
    pub pinned_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.diffs.iter().filter(|d| d.kind == kind).count()
    }
}

/// list local pins ascending by version, keeping only the newest `limit`
pub fn log(repo: &Repo, limit: Option<usize>) -> Result<Vec<LogEntry>> {
    let objects = repo.objects_path();
    let names = fs::read_dir(&objects)
        .with_path(&objects)?
        .collect::<std::io::Result<Vec<_>>>()
        .with_path(&objects)?
        .into_iter()
        .map(|e| e.file_name().to_string_lossy().into_owned());

    let mut entries = Vec::new();
    for version in sort_versions(names) {
        let archive = repo.archive_path(version);
        if !archive.is_file() {
            warn!(version = %version, "version has no archive; skipping");
            continue;
        }

        let summary = read_summary(&archive)?;
        let pinned_at = fs::metadata(&archive)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        entries.push(LogEntry {
            version,
            message: summary.message,
            diffs: summary.diffs,
            pinned_at,
        });
    }

    if let Some(max) = limit {
        let skip = entries.len().saturating_sub(max);
        entries.drain(..skip);
    }

    Ok(entries)
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "version {}", self.version)?;
        if let Some(at) = self.pinned_at {
            writeln!(f, "Date:    {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        writeln!(
            f,
            "Changes: {} added, {} removed",
            self.count(ChangeKind::Added),
            self.count(ChangeKind::Removed)
        )?;

        writeln!(f)?;
        for line in self.message.lines() {
            writeln!(f, "    {}", line)?;
        }

        Ok(())
    }
}
