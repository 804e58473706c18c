//! working-tree snapshots: the set of tracked audio paths at one moment

use std::collections::BTreeSet;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::repo::STORE_DIR;

/// extension of files that are tracked
pub const AUDIO_EXTENSION: &str = "wav";

/// set of tracked paths, relative to the project root and `/`-separated
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    paths: BTreeSet<String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// walk `root` and collect every regular `.wav` file, skipping the store
    pub fn capture(root: &Path) -> Result<Self> {
        let mut paths = BTreeSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != STORE_DIR);

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                Error::Io {
                    path,
                    source: e.into(),
                }
            })?;

            if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| Error::InvalidName(entry.path().display().to_string()))?;
            paths.insert(to_slash_path(rel)?);
        }

        Ok(Self { paths })
    }

    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// paths in lexical order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Snapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == AUDIO_EXTENSION)
}

fn to_slash_path(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| Error::InvalidName(rel.display().to_string()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_capture_filters_by_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("kick.wav"), b"k").unwrap();
        fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        fs::write(dir.path().join("mix.WAV.bak"), b"b").unwrap();
        fs::create_dir_all(dir.path().join("stems/vox")).unwrap();
        fs::write(dir.path().join("stems/vox/lead.wav"), b"l").unwrap();

        let snap = Snapshot::capture(dir.path()).unwrap();
        let paths: Vec<&str> = snap.iter().collect();
        assert_eq!(paths, vec!["kick.wav", "stems/vox/lead.wav"]);
    }

    #[test]
    fn test_capture_skips_store() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".stew/objects")).unwrap();
        fs::write(dir.path().join(".stew/objects/stale.wav"), b"x").unwrap();
        fs::write(dir.path().join("take.wav"), b"t").unwrap();

        let snap = Snapshot::capture(dir.path()).unwrap();
        assert_eq!(snap.len(), 1);
        assert!(snap.contains("take.wav"));
    }

    #[test]
    fn test_capture_skips_directories_named_like_audio() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("folder.wav")).unwrap();

        let snap = Snapshot::capture(dir.path()).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn test_set_semantics() {
        let mut snap = Snapshot::new();
        assert!(snap.insert("a.wav"));
        assert!(!snap.insert("a.wav"));
        assert_eq!(snap.len(), 1);
    }
}
