use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, IoResultExt, Result};

const PATCH_EXTENSION: &str = ".bin";

/// direction of a patch artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatchOp {
    /// remove `length` bytes at `offset`
    Subtract,
    /// insert the payload at `offset`
    Add,
}

impl PatchOp {
    fn code(self) -> &'static str {
        match self {
            PatchOp::Add => "a",
            PatchOp::Subtract => "s",
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOp::Add => f.write_str("addition"),
            PatchOp::Subtract => f.write_str("subtraction"),
        }
    }
}

/// parsed patch file name: `{base}_{a|s}_offset{N}_len{M}.bin`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchName {
    pub base: String,
    pub op: PatchOp,
    pub offset: u64,
    pub length: u64,
}

impl PatchName {
    /// parse the final component of `path`
    pub fn parse(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPatchName(path.display().to_string()))?;
        let invalid = || Error::InvalidPatchName(name.clone());

        let parts: Vec<&str> = name.split('_').collect();
        let [base, op, offset, length] = parts.as_slice() else {
            return Err(invalid());
        };

        let offset = offset
            .strip_prefix("offset")
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let length = length
            .strip_prefix("len")
            .and_then(|n| n.strip_suffix(PATCH_EXTENSION))
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(invalid)?;

        let op = match *op {
            "a" => PatchOp::Add,
            "s" => PatchOp::Subtract,
            other => return Err(Error::UnknownOperation(other.to_string())),
        };

        Ok(Self {
            base: base.to_string(),
            op,
            offset,
            length,
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_offset{}_len{}{}",
            self.base,
            self.op.code(),
            self.offset,
            self.length,
            PATCH_EXTENSION
        )
    }
}

/// splice one patch artifact into `target` in place
pub fn apply_patch(target: &Path, patch: &Path) -> Result<()> {
    let name = PatchName::parse(patch)?;
    let payload = fs::read(patch).with_path(patch)?;
    let original = fs::read(target).with_path(target)?;

    let patched = splice(&original, &name, &payload)?;
    replace_contents(target, &patched)?;

    debug!(
        target = %target.display(),
        op = %name.op,
        offset = name.offset,
        length = name.length,
        "applied patch"
    );
    Ok(())
}

/// apply several artifacts to `target`.
///
/// patches are applied from the highest offset down, subtraction before
/// addition at the same offset, so every offset refers to the unpatched file.
pub fn apply_patches(target: &Path, patches: &[PathBuf]) -> Result<()> {
    let mut parsed = patches
        .iter()
        .map(|p| PatchName::parse(p).map(|name| (name, p)))
        .collect::<Result<Vec<_>>>()?;
    parsed.sort_by(|(a, _), (b, _)| b.offset.cmp(&a.offset).then(a.op.cmp(&b.op)));

    for (_, path) in parsed {
        apply_patch(target, path)?;
    }
    Ok(())
}

fn splice(original: &[u8], name: &PatchName, payload: &[u8]) -> Result<Vec<u8>> {
    let actual = payload.len() as u64;
    if actual != name.length {
        return Err(Error::PatchLengthMismatch {
            declared: name.length,
            actual,
        });
    }

    let size = original.len() as u64;
    let out_of_range = || Error::OutOfRange {
        offset: name.offset,
        length: name.length,
        size,
    };

    match name.op {
        PatchOp::Add => {
            if name.offset > size {
                return Err(out_of_range());
            }
            let at = name.offset as usize;
            let mut out = Vec::with_capacity(original.len() + payload.len());
            out.extend_from_slice(&original[..at]);
            out.extend_from_slice(payload);
            out.extend_from_slice(&original[at..]);
            Ok(out)
        }
        PatchOp::Subtract => {
            let end = name
                .offset
                .checked_add(name.length)
                .filter(|end| *end <= size)
                .ok_or_else(out_of_range)?;
            let mut out = Vec::with_capacity(original.len() - name.length as usize);
            out.extend_from_slice(&original[..name.offset as usize]);
            out.extend_from_slice(&original[end as usize..]);
            Ok(out)
        }
    }
}

// write beside the target then rename over it
fn replace_contents(target: &Path, data: &[u8]) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    fs::write(&tmp, data).with_path(&tmp)?;
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io {
            path: target.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_patch_name() {
        let name = PatchName::parse(Path::new("track_a_offset1024_len256.bin")).unwrap();
        assert_eq!(
            name,
            PatchName {
                base: "track".to_string(),
                op: PatchOp::Add,
                offset: 1024,
                length: 256,
            }
        );
        assert_eq!(name.file_name(), "track_a_offset1024_len256.bin");
    }

    #[test]
    fn test_parse_uses_final_component_only() {
        let name = PatchName::parse(Path::new("/tmp/some_dir/track_s_offset8_len4.bin")).unwrap();
        assert_eq!(name.op, PatchOp::Subtract);
        assert_eq!(name.offset, 8);
    }

    #[test]
    fn test_parse_wrong_segment_count() {
        for bad in [
            "track_a_offset1024.bin",
            "my_track_a_offset1024_len256.bin",
            "track.bin",
        ] {
            let result = PatchName::parse(Path::new(bad));
            assert!(matches!(result, Err(Error::InvalidPatchName(_))), "{}", bad);
        }
    }

    #[test]
    fn test_parse_non_numeric_fields() {
        for bad in [
            "track_a_offsetX_len4.bin",
            "track_a_offset4_lenY.bin",
            "track_a_4_len4.bin",
            "track_a_offset4_len4.wav",
        ] {
            let result = PatchName::parse(Path::new(bad));
            assert!(matches!(result, Err(Error::InvalidPatchName(_))), "{}", bad);
        }
    }

    #[test]
    fn test_parse_unknown_operation() {
        let result = PatchName::parse(Path::new("track_x_offset0_len1.bin"));
        assert!(matches!(result, Err(Error::UnknownOperation(op)) if op == "x"));
    }

    #[test]
    fn test_apply_addition() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.pcm");
        fs::write(&target, [1u8, 2, 3, 4]).unwrap();
        let patch = dir.path().join("t_a_offset2_len2.bin");
        fs::write(&patch, [9u8, 9]).unwrap();

        apply_patch(&target, &patch).unwrap();
        assert_eq!(fs::read(&target).unwrap(), vec![1, 2, 9, 9, 3, 4]);
    }

    #[test]
    fn test_apply_addition_at_end() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.pcm");
        fs::write(&target, [1u8, 2]).unwrap();
        let patch = dir.path().join("t_a_offset2_len1.bin");
        fs::write(&patch, [3u8]).unwrap();

        apply_patch(&target, &patch).unwrap();
        assert_eq!(fs::read(&target).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_apply_subtraction() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.pcm");
        fs::write(&target, [1u8, 2, 3, 4, 5]).unwrap();
        let patch = dir.path().join("t_s_offset1_len3.bin");
        fs::write(&patch, [2u8, 3, 4]).unwrap();

        apply_patch(&target, &patch).unwrap();
        assert_eq!(fs::read(&target).unwrap(), vec![1, 5]);
    }

    #[test]
    fn test_apply_out_of_range() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.pcm");
        fs::write(&target, [1u8, 2, 3, 4]).unwrap();

        let sub = dir.path().join("t_s_offset3_len2.bin");
        fs::write(&sub, [0u8, 0]).unwrap();
        assert!(matches!(
            apply_patch(&target, &sub),
            Err(Error::OutOfRange { offset: 3, length: 2, size: 4 })
        ));

        let add = dir.path().join("t_a_offset5_len1.bin");
        fs::write(&add, [0u8]).unwrap();
        assert!(matches!(apply_patch(&target, &add), Err(Error::OutOfRange { .. })));

        // target untouched
        assert_eq!(fs::read(&target).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_apply_length_mismatch() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.pcm");
        fs::write(&target, [1u8, 2, 3, 4]).unwrap();
        let patch = dir.path().join("t_a_offset0_len3.bin");
        fs::write(&patch, [0u8]).unwrap();

        assert!(matches!(
            apply_patch(&target, &patch),
            Err(Error::PatchLengthMismatch { declared: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_apply_patches_orders_subtraction_first() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.pcm");
        fs::write(&target, [1u8, 2, 3, 4]).unwrap();

        let add = dir.path().join("t_a_offset1_len3.bin");
        fs::write(&add, [7u8, 8, 9]).unwrap();
        let sub = dir.path().join("t_s_offset1_len2.bin");
        fs::write(&sub, [2u8, 3]).unwrap();

        // given addition first, still subtracts first
        apply_patches(&target, &[add, sub]).unwrap();
        assert_eq!(fs::read(&target).unwrap(), vec![1, 7, 8, 9, 4]);
    }

    #[test]
    fn test_apply_patches_invalid_name_changes_nothing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.pcm");
        fs::write(&target, [1u8, 2]).unwrap();
        let good = dir.path().join("t_a_offset0_len1.bin");
        fs::write(&good, [0u8]).unwrap();
        let bad = dir.path().join("nonsense.bin");
        fs::write(&bad, [0u8]).unwrap();

        assert!(apply_patches(&target, &[good, bad]).is_err());
        assert_eq!(fs::read(&target).unwrap(), vec![1, 2]);
    }
}
