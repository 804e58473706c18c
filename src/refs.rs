use std::fs;

use tracing::warn;

use crate::error::{Error, Result};
use crate::repo::Repo;
use crate::snapshot::Snapshot;
use crate::version::Version;

/// write the tracked-path list of a version (one path per line)
pub fn write_refs(repo: &Repo, version: Version, snapshot: &Snapshot) -> Result<()> {
    let mut content = String::new();
    for path in snapshot.iter() {
        content.push_str(path);
        content.push('\n');
    }

    repo.write_atomic(&repo.refs_path(version), content.as_bytes())
}

/// read the tracked-path list of a version
pub fn read_refs(repo: &Repo, version: Version) -> Result<Snapshot> {
    let path = repo.refs_path(version);

    let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!("refs for version {}", version)),
        std::io::ErrorKind::InvalidData => Error::CorruptState {
            path: path.clone(),
            message: "refs file is not valid utf-8".to_string(),
        },
        _ => Error::Io {
            path: path.clone(),
            source: e,
        },
    })?;

    Ok(content.lines().filter(|l| !l.is_empty()).collect())
}

/// check if refs were recorded for a version
pub fn refs_exist(repo: &Repo, version: Version) -> bool {
    repo.refs_path(version).is_file()
}

/// tracked paths of the version a pin of `version` is diffed against.
///
/// only `minor - 1` in the same major is consulted. when that record is absent
/// (first minor, a skipped version, or a new major) the result is an empty set,
/// so every tracked file gets recorded as added again.
pub fn previous_refs(repo: &Repo, version: Version) -> Result<Snapshot> {
    let Some(prev) = version.predecessor() else {
        return Ok(Snapshot::new());
    };

    match read_refs(repo, prev) {
        Ok(snapshot) => Ok(snapshot),
        Err(Error::NotFound(_)) => {
            warn!(
                version = %version,
                previous = %prev,
                "no refs recorded for previous version; diffing against an empty set"
            );
            Ok(Snapshot::new())
        }
        Err(e) => Err(e),
    }
}
