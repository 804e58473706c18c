use std::path::Path;

use tracing::info;

use super::pin::record_version;
use crate::config::Config;
use crate::error::Result;
use crate::repo::Repo;
use crate::snapshot::Snapshot;
use crate::version::Version;

/// outcome of initialising a working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub version: Version,
    /// audio files the first pin will record as added
    pub tracked: usize,
}

/// create the store under `root` and record an empty baseline version.
///
/// the baseline has no refs and an archive with an empty manifest, so the
/// first pin diffs the whole tree against nothing.
pub fn init(root: &Path, config: Config) -> Result<(Repo, InitReport)> {
    let repo = Repo::init(root, config)?;
    let version = Version::INITIAL;

    let message = format!("Initial version {}", version);
    record_version(&repo, version, &message, &[], &Snapshot::new())?;

    let tracked = Snapshot::capture(repo.root())?.len();
    info!(root = %root.display(), version = %version, tracked, "initialised repository");

    Ok((repo, InitReport { version, tracked }))
}
