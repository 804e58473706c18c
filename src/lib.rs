//! stew - version control for audio projects
//!
//! a working copy keeps immutable pins of its `.wav` files under `.stew/` and
//! syncs them to a pin server over http.
//!
//! # Core concepts
//!
//! - **Version**: `major.minor`; every pin bumps the minor
//! - **Refs**: the tracked paths recorded for a version
//! - **Diff**: paths added or removed since the previous version
//! - **Archive**: gzip-compressed tar of a pin's message, diff manifest and
//!   the full contents of every added file
//! - **Patch**: sample-level subtraction/addition between two audio files
//!
//! # Layout
//!
//! ```text
//! .stew/version                         "major.minor"
//! .stew/thamizh.toml                    remote server and project
//! .stew/objects/{version}/refs          one tracked path per line
//! .stew/objects/{version}/diffs.json    diff manifest
//! .stew/objects/{version}/lean.tar.gz   archive
//! ```
//!
//! # Example usage
//!
//! ```no_run
//! use stew::{ops, Config, Remote};
//! use std::path::Path;
//!
//! let config = Config::new(Remote::new("http://localhost:6969", "demo"));
//! let (repo, _) = ops::init(Path::new("/path/to/project"), config).unwrap();
//!
//! let pinned = ops::pin(&repo, Some("first take")).unwrap();
//! println!("pinned {}", pinned.version);
//! ```

mod config;
mod error;
mod refs;
mod repo;

pub mod archive;
pub mod diff;
pub mod ops;
pub mod sample;
pub mod snapshot;
pub mod telemetry;
pub mod transport;
pub mod version;

pub use config::{Config, Remote};
pub use diff::{diff_snapshots, ChangeKind, Diff};
pub use error::{Error, IoResultExt, Result};
pub use refs::{previous_refs, read_refs, refs_exist, write_refs};
pub use repo::{is_repo, Repo, RepoLock, ARCHIVE_NAME, STORE_DIR};
pub use snapshot::Snapshot;
pub use version::Version;
