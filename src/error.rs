use std::path::PathBuf;

use crate::sample::SampleFormat;

/// error type for stew operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a stew repository: {0}")]
    NotARepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("corrupt store state at {path}: {message}")]
    CorruptState { path: PathBuf, message: String },

    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),

    #[error("sample format mismatch: old file is {old}, new file is {new}")]
    FormatMismatch {
        old: SampleFormat,
        new: SampleFormat,
    },

    #[error("unsupported audio in {path}: {message}")]
    UnsupportedAudio { path: PathBuf, message: String },

    #[error("invalid patch file name: {0}")]
    InvalidPatchName(String),

    #[error("unknown patch operation: {0}")]
    UnknownOperation(String),

    #[error("patch out of range: offset {offset} + length {length} exceeds target size {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    #[error("patch payload is {actual} bytes but its name declares {declared}")]
    PatchLengthMismatch { declared: u64, actual: u64 },

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("entry not found in archive: {0}")]
    EntryNotFound(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("upload rejected ({status}): {body}")]
    UploadRejected { status: u16, body: String },

    #[error("remote returned {status}: {message}")]
    RemoteError { status: u16, message: String },

    #[error("remote request failed: {0}")]
    RemoteConnection(String),

    #[error("no remote configured")]
    RemoteConfig,

    #[error("lock contention on repository")]
    LockContention,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RemoteConnection(e.to_string())
    }
}

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
