//! on-disk pin store: `{root}/{project}/objects/{version}/lean.tar.gz`

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, IoResultExt, Result};
use crate::repo::ARCHIVE_NAME;
use crate::version::{sort_versions, Version};

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = ".tmp";

/// check that a project name is a single safe path component
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0');
    if invalid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// project record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// filesystem-backed project and pin storage
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project: &str) -> Result<PathBuf> {
        validate_name(project)?;
        Ok(self.root.join(project))
    }

    fn existing_project(&self, project: &str) -> Result<PathBuf> {
        let dir = self.project_dir(project)?;
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("project {}", project)));
        }
        Ok(dir)
    }

    fn version_dir(&self, project: &str, version: Version) -> Result<PathBuf> {
        Ok(self
            .project_dir(project)?
            .join(OBJECTS_DIR)
            .join(version.to_string()))
    }

    /// project names, sorted; hidden directories are not projects
    pub fn list_projects(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Io {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_path(&self.root)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// create an empty project; `Conflict` if it exists
    pub fn create_project(&self, project: &str) -> Result<()> {
        let dir = self.project_dir(project)?;
        fs::create_dir_all(&self.root).with_path(&self.root)?;

        match fs::create_dir(&dir) {
            Ok(()) => {
                info!(project, "created project");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(Error::Conflict(format!("project {}", project)))
            }
            Err(e) => Err(Error::Io {
                path: dir,
                source: e,
            }),
        }
    }

    pub fn project(&self, project: &str) -> Result<ProjectRecord> {
        let dir = self.existing_project(project)?;
        let modified = fs::metadata(&dir)
            .and_then(|m| m.modified())
            .with_path(&dir)?;

        Ok(ProjectRecord {
            name: project.to_string(),
            last_modified: DateTime::<Utc>::from(modified),
        })
    }

    /// remove a project and every pin in it
    pub fn delete_project(&self, project: &str) -> Result<()> {
        let dir = self.existing_project(project)?;
        fs::remove_dir_all(&dir).with_path(&dir)?;
        info!(project, "deleted project");
        Ok(())
    }

    /// stored versions of a project, ascending by (major, minor)
    pub fn list_pins(&self, project: &str) -> Result<Vec<Version>> {
        let objects = self.existing_project(project)?.join(OBJECTS_DIR);
        let entries = match fs::read_dir(&objects) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Io {
                    path: objects,
                    source: e,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_path(&objects)?;
            if entry.path().join(ARCHIVE_NAME).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(sort_versions(names))
    }

    /// path of a stored archive; `NotFound` if the project or pin is absent
    pub fn archive_path(&self, project: &str, version: Version) -> Result<PathBuf> {
        self.existing_project(project)?;
        let path = self.version_dir(project, version)?.join(ARCHIVE_NAME);
        if !path.is_file() {
            return Err(Error::NotFound(format!("pin {} of {}", version, project)));
        }
        Ok(path)
    }

    /// fresh temp path for an incoming upload
    pub fn upload_path(&self) -> Result<PathBuf> {
        let tmp = self.root.join(TMP_DIR);
        fs::create_dir_all(&tmp).with_path(&tmp)?;
        Ok(tmp.join(uuid::Uuid::new_v4().to_string()))
    }

    /// move a finished upload into place as `version` of `project`.
    ///
    /// the version directory is created exclusively, so of two racing uploads
    /// exactly one wins; the other gets `Conflict` and its temp file is removed.
    /// an unknown project is created on the way.
    pub fn commit_upload(&self, project: &str, version: Version, upload: &Path) -> Result<PathBuf> {
        let result = self.place_upload(project, version, upload);
        if result.is_err() {
            let _ = fs::remove_file(upload);
        }
        result
    }

    fn place_upload(&self, project: &str, version: Version, upload: &Path) -> Result<PathBuf> {
        let dir = self.version_dir(project, version)?;
        if let Some(objects) = dir.parent() {
            fs::create_dir_all(objects).with_path(objects)?;
        }

        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(project, version = %version, "rejecting duplicate pin");
                return Err(Error::Conflict(format!("pin {} of {}", version, project)));
            }
            Err(e) => {
                return Err(Error::Io {
                    path: dir,
                    source: e,
                })
            }
        }

        let path = dir.join(ARCHIVE_NAME);
        if let Err(e) = fs::rename(upload, &path) {
            let _ = fs::remove_dir(&dir);
            return Err(Error::Io { path, source: e });
        }
        info!(project, version = %version, "stored pin");
        Ok(path)
    }
}
