//! http client for a stew sync server

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::Url;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{CreateProject, PinMeta, ProjectInfo};
use crate::config::{Config, Remote};
use crate::error::{Error, IoResultExt, Result};
use crate::repo::ARCHIVE_NAME;
use crate::version::Version;

/// client bound to one remote project
#[derive(Debug, Clone)]
pub struct Client {
    remote: Remote,
    http: reqwest::Client,
}

impl Client {
    pub fn new(remote: Remote) -> Self {
        Self {
            remote,
            http: reqwest::Client::new(),
        }
    }

    /// client for the remote configured in a working copy
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.remote()?.clone()))
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    /// `{server}/api/v1/projects/{tail...}` with every tail segment percent-encoded
    fn endpoint(&self, tail: &[&str]) -> Result<Url> {
        let invalid = || Error::InvalidName(format!("server url {}", self.remote.server));
        let mut url = Url::parse(&self.remote.server).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["api", "v1", "projects"])
            .extend(tail);
        Ok(url)
    }

    fn pins_url(&self, tail: &[&str]) -> Result<Url> {
        let mut segments = vec![self.remote.project.as_str(), "pins"];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    /// upload an archive as `version`; anything but 201 is `UploadRejected`
    pub async fn push(&self, archive: &Path, version: Version) -> Result<()> {
        let file = tokio::fs::File::open(archive).await.with_path(archive)?;
        let len = file.metadata().await.with_path(archive)?.len();

        let meta = serde_json::to_string(&PinMeta {
            version: version.to_string(),
        })?;
        let file_part = Part::stream_with_length(file, len)
            .file_name(ARCHIVE_NAME)
            .mime_str("application/gzip")?;
        let form = Form::new().text("meta", meta).part("file", file_part);

        let url = self.pins_url(&[])?;
        let resp = self.http.post(url).multipart(form).send().await?;

        match resp.status().as_u16() {
            201 => {
                debug!(version = %version, bytes = len, "pushed pin");
                Ok(())
            }
            status => Err(Error::UploadRejected {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    /// download the archive of `version` to `dest`, returning its size
    pub async fn checkout(&self, version: Version, dest: &Path) -> Result<u64> {
        let url = self.pins_url(&[version.to_string().as_str()])?;
        let mut resp = expect_ok(self.http.get(url).send().await?).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.with_path(parent)?;
        }
        let partial = dest.with_extension("part");
        let written = match download(&mut resp, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, dest).await.with_path(dest)?;
        Ok(written)
    }

    /// fetch one file of a pin without downloading the archive
    pub async fn fetch_file(&self, version: Version, file: &str) -> Result<Vec<u8>> {
        let url = self.pins_url(&[version.to_string().as_str(), "file"])?;
        let resp = self.http.get(url).query(&[("file", file)]).send().await?;
        let resp = expect_ok(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// versions stored for the project, ascending
    pub async fn list_pins(&self) -> Result<Vec<Version>> {
        let resp = expect_ok(self.http.get(self.pins_url(&[])?).send().await?).await?;
        let names: Vec<String> = resp.json().await?;
        names.iter().map(|n| Version::parse(n)).collect()
    }

    pub async fn list_projects(&self) -> Result<Vec<String>> {
        let resp = expect_ok(self.http.get(self.endpoint(&[])?).send().await?).await?;
        Ok(resp.json().await?)
    }

    pub async fn project_info(&self) -> Result<ProjectInfo> {
        let url = self.endpoint(&[self.remote.project.as_str()])?;
        let resp = expect_ok(self.http.get(url).send().await?).await?;
        Ok(resp.json().await?)
    }

    /// create the project on the server; an existing project is `Conflict`
    pub async fn create_project(&self) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint(&[])?)
            .json(&CreateProject {
                name: self.remote.project.clone(),
            })
            .send()
            .await?;

        match resp.status().as_u16() {
            201 => Ok(()),
            409 => Err(Error::Conflict(format!("project {}", self.remote.project))),
            status => Err(Error::RemoteError {
                status,
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// stream a response body into `path`, returning the byte count
async fn download(resp: &mut reqwest::Response, path: &Path) -> Result<u64> {
    let mut out = tokio::fs::File::create(path).await.with_path(path)?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        out.write_all(&chunk).await.with_path(path)?;
        written += chunk.len() as u64;
    }
    out.flush().await.with_path(path)?;
    Ok(written)
}

async fn expect_ok(resp: reqwest::Response) -> Result<reqwest::Response> {
    match resp.status().as_u16() {
        200 => Ok(resp),
        status => Err(Error::RemoteError {
            status,
            message: resp.text().await.unwrap_or_default(),
        }),
    }
}
