//! pin archive codec
//!
//! an archive is a gzip-compressed tar holding exactly, in order:
//!
//! - `message`: the pin message
//! - `diffs.json`: the version's diff manifest
//! - `files/{path}`: full contents of every file the manifest marks as added
//!
//! removals live only in the manifest; `files/` never carries tombstones.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{EntryType, Header};
use tracing::debug;

use crate::diff::{added_paths, Diff};
use crate::error::{Error, IoResultExt, Result};

pub const MESSAGE_ENTRY: &str = "message";
pub const DIFFS_ENTRY: &str = "diffs.json";
pub const FILES_PREFIX: &str = "files/";

/// permission bits of every entry
const ENTRY_MODE: u32 = 0o644;

/// a fully decoded archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinArchive {
    pub message: String,
    pub diffs: Vec<Diff>,
    /// added file contents keyed by their path relative to the project root
    pub files: BTreeMap<String, Vec<u8>>,
}

impl PinArchive {
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }
}

/// write an archive for `diffs` to `out`, reading added files from `root`
pub fn pack<W: Write>(out: W, message: &str, diffs: &[Diff], root: &Path) -> Result<W> {
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let now = unix_now();

    append_bytes(&mut builder, MESSAGE_ENTRY, message.as_bytes(), now)?;

    let manifest = serde_json::to_vec(diffs)?;
    append_bytes(&mut builder, DIFFS_ENTRY, &manifest, now)?;

    for rel in added_paths(diffs) {
        let src = root.join(rel);
        let file = File::open(&src).with_path(&src)?;
        let meta = file.metadata().with_path(&src)?;

        let mut header = entry_header(meta.len(), mtime_of(&meta).unwrap_or(now));
        let name = format!("{}{}", FILES_PREFIX, rel);
        builder
            .append_data(&mut header, &name, file.take(meta.len()))
            .with_path(&src)?;
        debug!(entry = %name, bytes = meta.len(), "archived file");
    }

    let encoder = builder.into_inner().with_path("<archive>")?;
    encoder.finish().with_path("<archive>")
}

/// pack into memory
pub fn pack_to_vec(message: &str, diffs: &[Diff], root: &Path) -> Result<Vec<u8>> {
    pack(Vec::new(), message, diffs, root)
}

/// decode a whole archive
pub fn unpack<R: Read>(reader: R) -> Result<PinArchive> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let label = PathBuf::from("<archive>");

    let mut message = None;
    let mut diffs = None;
    let mut files = BTreeMap::new();

    for entry in archive.entries().map_err(|e| corrupt(&label, e))? {
        let mut entry = entry.map_err(|e| corrupt(&label, e))?;
        let name = entry_name(&entry)?;

        match name.as_str() {
            MESSAGE_ENTRY => {
                let mut text = String::new();
                entry
                    .read_to_string(&mut text)
                    .map_err(|e| corrupt(&label, e))?;
                message = Some(text);
            }
            DIFFS_ENTRY => {
                let mut raw = Vec::new();
                entry.read_to_end(&mut raw).map_err(|e| corrupt(&label, e))?;
                diffs = Some(serde_json::from_slice::<Vec<Diff>>(&raw)?);
            }
            _ => {
                if let Some(rel) = name.strip_prefix(FILES_PREFIX) {
                    let mut data = Vec::with_capacity(entry.size() as usize);
                    entry
                        .read_to_end(&mut data)
                        .map_err(|e| corrupt(&label, e))?;
                    files.insert(rel.to_string(), data);
                } else {
                    debug!(entry = %name, "ignoring unknown archive entry");
                }
            }
        }
    }

    let message = message.ok_or_else(|| missing_entry(&label, MESSAGE_ENTRY))?;
    let diffs = diffs.ok_or_else(|| missing_entry(&label, DIFFS_ENTRY))?;

    Ok(PinArchive {
        message,
        diffs,
        files,
    })
}

/// decode the archive stored at `path`
pub fn read_archive(path: &Path) -> Result<PinArchive> {
    let file = File::open(path).with_path(path)?;
    unpack(io::BufReader::new(file)).map_err(|e| match e {
        Error::CorruptState { message, .. } => Error::CorruptState {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// message and manifest of an archive, read without touching `files/`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub message: String,
    pub diffs: Vec<Diff>,
}

/// read the leading `message` and `diffs.json` entries of the archive at `path`
pub fn read_summary(path: &Path) -> Result<ArchiveSummary> {
    let file = File::open(path).with_path(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(io::BufReader::new(file)));

    let mut message = None;
    let mut diffs = None;

    for entry in archive.entries().map_err(|e| corrupt(path, e))? {
        let mut entry = entry.map_err(|e| corrupt(path, e))?;
        match entry_name(&entry)?.as_str() {
            MESSAGE_ENTRY => {
                let mut text = String::new();
                entry.read_to_string(&mut text).map_err(|e| corrupt(path, e))?;
                message = Some(text);
            }
            DIFFS_ENTRY => {
                let mut raw = Vec::new();
                entry.read_to_end(&mut raw).map_err(|e| corrupt(path, e))?;
                diffs = Some(serde_json::from_slice::<Vec<Diff>>(&raw)?);
            }
            _ => {}
        }
        if message.is_some() && diffs.is_some() {
            break;
        }
    }

    Ok(ArchiveSummary {
        message: message.ok_or_else(|| missing_entry(path, MESSAGE_ENTRY))?,
        diffs: diffs.ok_or_else(|| missing_entry(path, DIFFS_ENTRY))?,
    })
}

/// sequential reader that locates single files without extracting the rest
pub struct ArchiveReader<R: Read> {
    inner: tar::Archive<GzDecoder<R>>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: tar::Archive::new(GzDecoder::new(reader)),
        }
    }

    /// scan forward to `files/{path}` and return a reader over its bytes.
    ///
    /// a truncated or corrupt stream is reported the same as a missing entry.
    pub fn find_file(&mut self, path: &str) -> Result<impl Read + '_> {
        let wanted = format!("{}{}", FILES_PREFIX, path);
        let not_found = || Error::EntryNotFound(path.to_string());

        let entries = self.inner.entries().map_err(|e| {
            debug!(error = %e, "archive unreadable");
            not_found()
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                debug!(error = %e, "archive scan stopped");
                not_found()
            })?;

            let matches = entry
                .path()
                .map(|p| p.to_str() == Some(wanted.as_str()))
                .unwrap_or(false);
            if matches {
                return Ok(entry);
            }
        }

        Err(not_found())
    }
}

/// copy `files/{path}` from an archive stream into `out`, returning the byte count
pub fn extract_file<R: Read, W: Write>(reader: R, path: &str, out: &mut W) -> Result<u64> {
    let mut archive = ArchiveReader::new(reader);
    let mut entry = archive.find_file(path)?;
    io::copy(&mut entry, out).with_path(path)
}

/// write every `files/` entry of an archive below `dest`, returning their paths
pub fn extract_files<R: Read>(reader: R, dest: &Path) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let label = PathBuf::from("<archive>");
    let mut written = Vec::new();

    for entry in archive.entries().map_err(|e| corrupt(&label, e))? {
        let mut entry = entry.map_err(|e| corrupt(&label, e))?;
        let name = entry_name(&entry)?;

        let Some(rel) = name.strip_prefix(FILES_PREFIX) else {
            continue;
        };
        let rel_path = safe_relative_path(rel)?;

        let target = dest.join(&rel_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let mut out = File::create(&target).with_path(&target)?;
        io::copy(&mut entry, &mut out).with_path(&target)?;

        written.push(rel.to_string());
    }

    Ok(written)
}

fn append_bytes<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
    mtime: u64,
) -> Result<()> {
    let mut header = entry_header(data.len() as u64, mtime);
    builder.append_data(&mut header, name, data).with_path(name)
}

fn entry_header(size: u64, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(ENTRY_MODE);
    header.set_size(size);
    header.set_mtime(mtime);
    header
}

fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String> {
    let path = entry
        .path()
        .map_err(|e| corrupt(Path::new("<archive>"), e))?;
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidName(path.display().to_string()))
}

/// reject absolute paths and parent traversal in entry names
fn safe_relative_path(rel: &str) -> Result<PathBuf> {
    let path = Path::new(rel);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(Error::InvalidName(rel.to_string())),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(Error::InvalidName(rel.to_string()));
    }
    Ok(clean)
}

fn corrupt(path: &Path, e: io::Error) -> Error {
    Error::CorruptState {
        path: path.to_path_buf(),
        message: format!("unreadable archive: {}", e),
    }
}

fn missing_entry(path: &Path, entry: &str) -> Error {
    Error::CorruptState {
        path: path.to_path_buf(),
        message: format!("archive has no {} entry", entry),
    }
}

fn mtime_of(meta: &fs::Metadata) -> Option<u64> {
    meta.modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn project_with(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for (path, data) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, data).unwrap();
        }
        dir
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let dir = project_with(&[
            ("kick.wav", b"kick-data".as_slice()),
            ("stems/bass.wav", [0u8, 1, 2, 255].as_slice()),
        ]);
        let diffs = vec![
            Diff::added("kick.wav"),
            Diff::added("stems/bass.wav"),
            Diff::removed("old.wav"),
        ];

        let bytes = pack_to_vec("Pinned version 0.2", &diffs, dir.path()).unwrap();
        let archive = unpack(bytes.as_slice()).unwrap();

        assert_eq!(archive.message, "Pinned version 0.2");
        assert_eq!(archive.diffs, diffs);
        assert_eq!(archive.files.len(), 2);
        assert_eq!(archive.file("kick.wav"), Some(&b"kick-data"[..]));
        assert_eq!(archive.file("stems/bass.wav"), Some(&[0u8, 1, 2, 255][..]));
    }

    #[test]
    fn test_entry_order_and_modes() {
        let dir = project_with(&[("a.wav", b"a".as_slice())]);
        let bytes = pack_to_vec("m", &[Diff::added("a.wav")], dir.path()).unwrap();

        assert_eq!(entry_names(&bytes), vec!["message", "diffs.json", "files/a.wav"]);

        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            assert_eq!(entry.header().mode().unwrap(), ENTRY_MODE);
        }
    }

    #[test]
    fn test_removed_files_have_no_blob() {
        let dir = tempdir().unwrap();
        let bytes = pack_to_vec("m", &[Diff::removed("gone.wav")], dir.path()).unwrap();

        assert_eq!(entry_names(&bytes), vec!["message", "diffs.json"]);
        let archive = unpack(bytes.as_slice()).unwrap();
        assert!(archive.files.is_empty());
        assert_eq!(archive.diffs, vec![Diff::removed("gone.wav")]);
    }

    #[test]
    fn test_pack_missing_source_file() {
        let dir = tempdir().unwrap();
        let result = pack_to_vec("m", &[Diff::added("nope.wav")], dir.path());
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_read_summary_skips_files() {
        let dir = project_with(&[("a.wav", b"aaaa".as_slice())]);
        let diffs = vec![Diff::added("a.wav"), Diff::removed("b.wav")];
        let path = dir.path().join("lean.tar.gz");
        fs::write(&path, pack_to_vec("Pinned version 0.3", &diffs, dir.path()).unwrap()).unwrap();

        let summary = read_summary(&path).unwrap();
        assert_eq!(summary.message, "Pinned version 0.3");
        assert_eq!(summary.diffs, diffs);
    }

    #[test]
    fn test_extract_single_file() {
        let dir = project_with(&[("a.wav", b"aaaa".as_slice()), ("b.wav", b"bbbbbb".as_slice())]);
        let diffs = vec![Diff::added("a.wav"), Diff::added("b.wav")];
        let bytes = pack_to_vec("m", &diffs, dir.path()).unwrap();

        let mut out = Vec::new();
        let n = extract_file(bytes.as_slice(), "b.wav", &mut out).unwrap();
        assert_eq!(n, 6);
        assert_eq!(out, b"bbbbbb");
    }

    #[test]
    fn test_extract_missing_file() {
        let dir = project_with(&[("a.wav", b"a".as_slice())]);
        let bytes = pack_to_vec("m", &[Diff::added("a.wav")], dir.path()).unwrap();

        let mut out = Vec::new();
        let result = extract_file(bytes.as_slice(), "zzz.wav", &mut out);
        assert!(matches!(result, Err(Error::EntryNotFound(_))));

        // the manifest entries are not addressable as files
        let result = extract_file(bytes.as_slice(), "../message", &mut out);
        assert!(matches!(result, Err(Error::EntryNotFound(_))));
    }

    #[test]
    fn test_extract_from_truncated_archive() {
        let dir = project_with(&[("a.wav", [7u8; 4096].as_slice())]);
        let bytes = pack_to_vec("m", &[Diff::added("a.wav")], dir.path()).unwrap();
        let truncated = &bytes[..bytes.len() / 3];

        let mut out = Vec::new();
        let result = extract_file(truncated, "a.wav", &mut out);
        assert!(result.is_err());
        assert!(matches!(
            extract_file(&b"not gzip at all"[..], "a.wav", &mut out),
            Err(Error::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_unpack_garbage_is_corrupt() {
        let result = unpack(&b"garbage"[..]);
        assert!(matches!(result, Err(Error::CorruptState { .. })));
    }

    #[test]
    fn test_extract_files_to_directory() {
        let dir = project_with(&[("x/y.wav", b"yy".as_slice()), ("z.wav", b"z".as_slice())]);
        let diffs = vec![Diff::added("x/y.wav"), Diff::added("z.wav")];
        let bytes = pack_to_vec("m", &diffs, dir.path()).unwrap();

        let dest = tempdir().unwrap();
        let mut written = extract_files(bytes.as_slice(), dest.path()).unwrap();
        written.sort();

        assert_eq!(written, vec!["x/y.wav", "z.wav"]);
        assert_eq!(fs::read(dest.path().join("x/y.wav")).unwrap(), b"yy");
        assert_eq!(fs::read(dest.path().join("z.wav")).unwrap(), b"z");
    }

    #[test]
    fn test_safe_relative_path() {
        assert!(safe_relative_path("a/b.wav").is_ok());
        assert!(safe_relative_path("../etc/passwd").is_err());
        assert!(safe_relative_path("/abs.wav").is_err());
        assert!(safe_relative_path("").is_err());
    }
}
