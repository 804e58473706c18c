use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// kind of change between two snapshots
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => f.write_str("added"),
            ChangeKind::Removed => f.write_str("removed"),
        }
    }
}

/// one entry of a version's diff manifest (`diffs.json`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diff {
    pub file: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

impl Diff {
    pub fn added(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind: ChangeKind::Added,
        }
    }

    pub fn removed(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind: ChangeKind::Removed,
        }
    }
}

/// symmetric difference of two snapshots.
///
/// paths only in `current` are added, paths only in `previous` are removed.
/// callers must not rely on the order of the result.
pub fn diff_snapshots(current: &Snapshot, previous: &Snapshot) -> Vec<Diff> {
    let added = current
        .iter()
        .filter(|p| !previous.contains(p))
        .map(Diff::added);
    let removed = previous
        .iter()
        .filter(|p| !current.contains(p))
        .map(Diff::removed);

    added.chain(removed).collect()
}

/// paths of the added entries in a diff set
pub fn added_paths(diffs: &[Diff]) -> impl Iterator<Item = &str> {
    diffs
        .iter()
        .filter(|d| d.kind == ChangeKind::Added)
        .map(|d| d.file.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn snap(paths: &[&str]) -> Snapshot {
        paths.iter().copied().collect()
    }

    fn as_set(diffs: Vec<Diff>) -> HashSet<Diff> {
        diffs.into_iter().collect()
    }

    #[test]
    fn test_diff_no_changes() {
        let s = snap(&["a.wav", "b.wav"]);
        assert!(diff_snapshots(&s, &s).is_empty());
    }

    #[test]
    fn test_diff_first_pin_adds_everything() {
        let current = snap(&["a.wav", "b.wav"]);
        let diffs = as_set(diff_snapshots(&current, &Snapshot::new()));

        let expected: HashSet<Diff> = [Diff::added("a.wav"), Diff::added("b.wav")].into();
        assert_eq!(diffs, expected);
    }

    #[test]
    fn test_diff_added_and_removed() {
        let previous = snap(&["keep.wav", "gone.wav"]);
        let current = snap(&["keep.wav", "new.wav"]);

        let diffs = as_set(diff_snapshots(&current, &previous));
        let expected: HashSet<Diff> = [Diff::added("new.wav"), Diff::removed("gone.wav")].into();
        assert_eq!(diffs, expected);
    }

    #[test]
    fn test_diff_is_symmetric_difference_without_overlap() {
        let previous = snap(&["a.wav", "b.wav", "c.wav", "d.wav"]);
        let current = snap(&["c.wav", "d.wav", "e.wav", "f.wav"]);
        let diffs = diff_snapshots(&current, &previous);

        let added: HashSet<&str> = added_paths(&diffs).collect();
        let removed: HashSet<&str> = diffs
            .iter()
            .filter(|d| d.kind == ChangeKind::Removed)
            .map(|d| d.file.as_str())
            .collect();

        assert!(added.is_disjoint(&removed));
        let union: HashSet<&str> = added.union(&removed).copied().collect();
        let expected: HashSet<&str> = ["a.wav", "b.wav", "e.wav", "f.wav"].into();
        assert_eq!(union, expected);
    }

    #[test]
    fn test_diff_json_shape() {
        let json = serde_json::to_string(&vec![Diff::added("x.wav"), Diff::removed("y.wav")]).unwrap();
        assert_eq!(
            json,
            r#"[{"file":"x.wav","type":"added"},{"file":"y.wav","type":"removed"}]"#
        );

        let parsed: Vec<Diff> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[1].kind, ChangeKind::Removed);
    }
}
