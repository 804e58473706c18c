use crate::diff::{diff_snapshots, Diff};
use crate::error::{Error, Result};
use crate::refs::read_refs;
use crate::repo::Repo;
use crate::snapshot::Snapshot;
use crate::version::Version;

/// working tree changes since the current version
#[derive(Debug, Clone)]
pub struct Status {
    pub version: Version,
    pub changes: Vec<Diff>,
}

impl Status {
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }
}

/// diff the working tree against the refs of the current version
pub fn status(repo: &Repo) -> Result<Status> {
    let version = repo.read_version()?;
    let recorded = match read_refs(repo, version) {
        Ok(refs) => refs,
        Err(Error::NotFound(_)) => Snapshot::new(),
        Err(e) => return Err(e),
    };

    let current = Snapshot::capture(repo.root())?;
    let mut changes = diff_snapshots(&current, &recorded);
    changes.sort_by(|a, b| a.file.cmp(&b.file));

    Ok(Status { version, changes })
}
