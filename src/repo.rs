use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::version::Version;

/// name of the store marker directory inside a working copy
pub const STORE_DIR: &str = ".stew";

/// fixed file name of every pin archive, locally and on the server
pub const ARCHIVE_NAME: &str = "lean.tar.gz";

const CONFIG_FILE: &str = "thamizh.toml";
const VERSION_FILE: &str = "version";
const REFS_FILE: &str = "refs";
const DIFFS_FILE: &str = "diffs.json";

/// check whether `root` holds a store marker directory.
///
/// this is an existence check only; a damaged store still counts.
pub fn is_repo(root: &Path) -> bool {
    root.join(STORE_DIR).is_dir()
}

/// a stew working copy: the project root plus its `.stew` store
pub struct Repo {
    root: PathBuf,
    config: Config,
}

impl Repo {
    /// create the store layout under `root` and write the initial version
    pub fn init(root: &Path, config: Config) -> Result<Self> {
        let store = root.join(STORE_DIR);
        if store.exists() {
            return Err(Error::RepoExists(root.to_path_buf()));
        }

        fs::create_dir_all(store.join("objects")).with_path(&store)?;
        fs::create_dir_all(store.join("tmp")).with_path(&store)?;

        let repo = Self {
            root: root.to_path_buf(),
            config,
        };
        repo.config.save(&repo.config_path())?;
        repo.write_version(Version::INITIAL)?;

        Ok(repo)
    }

    /// open an existing working copy, loading its config
    pub fn open(root: &Path) -> Result<Self> {
        if !is_repo(root) {
            return Err(Error::NotARepo(root.to_path_buf()));
        }

        let config_path = root.join(STORE_DIR).join(CONFIG_FILE);
        let config = if config_path.exists() {
            Config::load(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// project root (the directory that is snapshotted)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// repository configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// save configuration changes
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path())
    }

    /// path to the `.stew` directory
    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    /// path to thamizh.toml
    pub fn config_path(&self) -> PathBuf {
        self.store_path().join(CONFIG_FILE)
    }

    /// path to the version counter file
    pub fn version_path(&self) -> PathBuf {
        self.store_path().join(VERSION_FILE)
    }

    /// path to objects directory
    pub fn objects_path(&self) -> PathBuf {
        self.store_path().join("objects")
    }

    /// directory holding everything recorded for one version
    pub fn version_dir(&self, version: Version) -> PathBuf {
        self.objects_path().join(version.to_string())
    }

    /// archive of a version
    pub fn archive_path(&self, version: Version) -> PathBuf {
        self.version_dir(version).join(ARCHIVE_NAME)
    }

    /// tracked-path list of a version
    pub fn refs_path(&self, version: Version) -> PathBuf {
        self.version_dir(version).join(REFS_FILE)
    }

    /// local copy of a version's diff manifest
    pub fn diffs_path(&self, version: Version) -> PathBuf {
        self.version_dir(version).join(DIFFS_FILE)
    }

    /// where archives fetched from the remote are kept
    pub fn checkouts_path(&self) -> PathBuf {
        self.store_path().join("checkouts")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.store_path().join("tmp")
    }

    /// path to lock file
    pub fn lock_path(&self) -> PathBuf {
        self.store_path().join(".lock")
    }

    /// read the current version counter
    pub fn read_version(&self) -> Result<Version> {
        let path = self.version_path();
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CorruptState {
                    path: path.clone(),
                    message: "version file is missing".to_string(),
                }
            } else {
                Error::Io {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;

        Version::parse(&content).map_err(|_| Error::CorruptState {
            path,
            message: format!("unparseable version {:?}", content.trim()),
        })
    }

    /// overwrite the version counter atomically
    pub fn write_version(&self, version: Version) -> Result<()> {
        self.write_atomic(&self.version_path(), version.to_string().as_bytes())
    }

    /// write `data` to `path` via temp file, fsync and rename
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        let tmp_path = self.new_tmp_file()?;
        {
            let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
            tmp_file.write_all(data).with_path(&tmp_path)?;
            tmp_file.sync_all().with_path(&tmp_path)?;
        }

        self.persist_tmp(&tmp_path, path)
    }

    /// allocate a unique path inside the tmp directory
    pub fn new_tmp_file(&self) -> Result<PathBuf> {
        let tmp_dir = self.tmp_path();
        fs::create_dir_all(&tmp_dir).with_path(&tmp_dir)?;
        Ok(tmp_dir.join(uuid::Uuid::new_v4().to_string()))
    }

    /// rename a finished temp file into its final location
    pub fn persist_tmp(&self, tmp_path: &Path, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        if let Err(e) = fs::rename(tmp_path, path) {
            let _ = fs::remove_file(tmp_path);
            return Err(Error::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }

        if let Some(parent) = path.parent() {
            let dir = File::open(parent).with_path(parent)?;
            dir.sync_all().with_path(parent)?;
        }

        Ok(())
    }

    /// acquire exclusive lock on repository
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention)?;

        Ok(RepoLock { _flock: flock })
    }
}

/// guard that holds repository lock until dropped
pub struct RepoLock {
    _flock: Flock<File>,
}
