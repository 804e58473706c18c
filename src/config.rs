use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// repository configuration stored in `.stew/thamizh.toml`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// sync target for pins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Remote>,
}

impl Config {
    pub fn new(remote: Remote) -> Self {
        Self {
            remote: Some(remote),
        }
    }

    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// replace the configured remote
    pub fn set_remote(&mut self, server: impl Into<String>, project: impl Into<String>) {
        self.remote = Some(Remote::new(server, project));
    }

    /// configured remote, or `RemoteConfig` if none
    pub fn remote(&self) -> Result<&Remote> {
        self.remote.as_ref().ok_or(Error::RemoteConfig)
    }
}

/// a sync server and the project this working copy maps to on it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub server: String,
    pub project: String,
}

impl Remote {
    pub fn new(server: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            server: server.into().trim_end_matches('/').to_string(),
            project: project.into(),
        }
    }

    /// base url for this project's api
    pub fn project_url(&self) -> String {
        format!("{}/api/v1/projects/{}", self.server, self.project)
    }
}
