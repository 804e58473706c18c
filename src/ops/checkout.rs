use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::extract_files;
use crate::error::{IoResultExt, Result};
use crate::repo::Repo;
use crate::transport::Client;
use crate::version::Version;

/// a downloaded pin
#[derive(Debug, Clone)]
pub struct Checkout {
    pub version: Version,
    /// local copy of the archive
    pub archive: PathBuf,
    /// files written by `--into`, relative to that directory
    pub extracted: Vec<String>,
}

/// download `version` of the configured remote project and optionally unpack
/// its files into `into`
pub async fn checkout(repo: &Repo, version: Version, into: Option<&Path>) -> Result<Checkout> {
    let client = Client::from_config(repo.config())?;
    let archive = repo
        .checkouts_path()
        .join(&client.remote().project)
        .join(version.to_string())
        .join(format!("{}.tar.gz", version));

    let bytes = client.checkout(version, &archive).await?;
    info!(version = %version, bytes, path = %archive.display(), "downloaded pin");

    let extracted = match into {
        Some(dest) => {
            let file = File::open(&archive).with_path(&archive)?;
            extract_files(BufReader::new(file), dest)?
        }
        None => Vec::new(),
    };

    Ok(Checkout {
        version,
        archive,
        extracted,
    })
}
