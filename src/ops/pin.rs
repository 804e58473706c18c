use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::{debug, info, warn};

use crate::archive;
use crate::diff::{diff_snapshots, ChangeKind, Diff};
use crate::error::{Error, IoResultExt, Result};
use crate::refs::{previous_refs, write_refs};
use crate::repo::Repo;
use crate::snapshot::Snapshot;
use crate::transport::Client;
use crate::version::Version;

/// a locally recorded pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pinned {
    pub version: Version,
    pub diffs: Vec<Diff>,
}

impl Pinned {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.diffs.iter().filter(|d| d.kind == kind).count()
    }
}

/// what happened to the remote copy of a pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Pushed,
    /// the local pin stands; the upload did not
    Failed(String),
    Skipped,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Pushed => f.write_str("pushed"),
            SyncStatus::Failed(reason) => write!(f, "push failed: {}", reason),
            SyncStatus::Skipped => f.write_str("not pushed"),
        }
    }
}

/// local outcome plus remote outcome of `pin_and_push`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinReport {
    pub pinned: Pinned,
    pub remote: SyncStatus,
}

/// record a new version of the working tree.
///
/// bumps the minor version, diffs the tree against the previous version's
/// refs and persists the archive, refs and manifest. a failure part way
/// leaves the bumped version in place; the next pin moves past it.
pub fn pin(repo: &Repo, message: Option<&str>) -> Result<Pinned> {
    let _lock = repo.lock()?;

    let current = repo.read_version()?;
    let version = current.bump_minor().map_err(|_| Error::CorruptState {
        path: repo.version_path(),
        message: format!("version {} has no next minor", current),
    })?;
    repo.write_version(version)?;
    debug!(from = %current, to = %version, "bumped version");

    let snapshot = Snapshot::capture(repo.root())?;
    let previous = previous_refs(repo, version)?;
    let diffs = diff_snapshots(&snapshot, &previous);
    debug!(tracked = snapshot.len(), changes = diffs.len(), "computed diff");

    let message = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("Pinned version {}", version));
    record_version(repo, version, &message, &diffs, &snapshot)?;

    info!(version = %version, changes = diffs.len(), "pinned");
    Ok(Pinned { version, diffs })
}

/// pin locally, then upload unless `push` is false.
///
/// only local failures are errors; a failed upload is reported in the
/// returned `SyncStatus`.
pub async fn pin_and_push(repo: &Repo, message: Option<&str>, push: bool) -> Result<PinReport> {
    let pinned = pin(repo, message)?;

    let remote = if push {
        match push_version(repo, pinned.version).await {
            Ok(()) => SyncStatus::Pushed,
            Err(e) => {
                warn!(version = %pinned.version, error = %e, "pinned locally but push failed");
                SyncStatus::Failed(e.to_string())
            }
        }
    } else {
        SyncStatus::Skipped
    };

    Ok(PinReport { pinned, remote })
}

/// upload the archive of an existing local version to the configured remote
pub async fn push_version(repo: &Repo, version: Version) -> Result<()> {
    let archive = repo.archive_path(version);
    if !archive.is_file() {
        return Err(Error::NotFound(format!("local version {}", version)));
    }

    let client = Client::from_config(repo.config())?;
    client.push(&archive, version).await
}

/// write archive, refs and manifest for `version`
pub(crate) fn record_version(
    repo: &Repo,
    version: Version,
    message: &str,
    diffs: &[Diff],
    snapshot: &Snapshot,
) -> Result<()> {
    write_archive(repo, version, message, diffs)?;
    write_refs(repo, version, snapshot)?;

    let manifest = serde_json::to_vec(diffs)?;
    repo.write_atomic(&repo.diffs_path(version), &manifest)
}

fn write_archive(repo: &Repo, version: Version, message: &str, diffs: &[Diff]) -> Result<()> {
    let tmp = repo.new_tmp_file()?;

    let packed = File::create(&tmp)
        .with_path(&tmp)
        .and_then(|file| archive::pack(BufWriter::new(file), message, diffs, repo.root()))
        .and_then(|mut out| {
            out.flush().with_path(&tmp)?;
            out.get_ref().sync_all().with_path(&tmp)
        });
    if let Err(e) = packed {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    repo.persist_tmp(&tmp, &repo.archive_path(version))
}
