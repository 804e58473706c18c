//! stew - version control for audio project folders

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use stew::ops::{self, SyncStatus};
use stew::sample::{apply_patches, compare_files};
use stew::transport::{Server, ServerConfig};
use stew::{ChangeKind, Config, Remote, Repo, Version};

type CliResult = std::result::Result<(), Box<dyn StdError>>;

#[derive(Parser)]
#[command(name = "stew")]
#[command(about = "version control for audio projects - pin, push and patch sample data")]
#[command(version)]
struct Cli {
    /// working copy root
    #[arg(short = 'C', long, global = true, default_value = ".")]
    repo: PathBuf,

    /// debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize the working copy as a project with a remote
    Init {
        /// project name on the remote
        name: String,

        /// remote server url
        #[arg(short, long)]
        remote: String,
    },

    /// show or change the remote of the working copy
    Remote {
        /// new server url
        url: Option<String>,

        /// project name on the new server (default: unchanged)
        #[arg(short, long)]
        project: Option<String>,
    },

    /// record a new version and push it
    Pin {
        /// pin message
        #[arg(short, long)]
        message: Option<String>,

        /// keep the pin local
        #[arg(long)]
        no_push: bool,
    },

    /// upload an existing local version (default: current)
    Push {
        #[arg(value_parser = parse_version)]
        version: Option<Version>,
    },

    /// download a pinned version from the remote
    Checkout {
        #[arg(value_parser = parse_version)]
        version: Version,

        /// unpack the pinned files into this directory
        #[arg(long)]
        into: Option<PathBuf>,
    },

    /// show local pins
    Log {
        /// show only the newest n pins
        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },

    /// show changes since the current version
    Status,

    /// write sample-level patch streams between two wav files
    Compare {
        old: PathBuf,
        new: PathBuf,
        /// directory for the patch artifacts
        out_dir: PathBuf,
    },

    /// apply patch artifacts to a raw sample file
    Patch {
        target: PathBuf,

        #[arg(required = true)]
        patches: Vec<PathBuf>,
    },

    /// run the pin server
    Server {
        #[arg(short, long, default_value_t = stew::transport::server::DEFAULT_PORT)]
        port: u16,

        /// data directory
        #[arg(short, long, default_value = stew::transport::server::DEFAULT_DATA_DIR)]
        data: PathBuf,

        /// seconds in-flight requests may run after a shutdown signal
        #[arg(long, default_value_t = 5)]
        shutdown_grace_secs: u64,

        /// largest accepted upload
        #[arg(long, default_value_t = 1024)]
        max_upload_mb: usize,
    },
}

fn parse_version(s: &str) -> std::result::Result<Version, String> {
    Version::parse(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Server { .. }, false) => "info",
        (_, false) => "warn",
    };
    stew::telemetry::init_logging(default_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cli: Cli) -> CliResult {
    match cli.command {
        Commands::Init { name, remote } => {
            let config = Config::new(Remote::new(remote.as_str(), name.as_str()));
            let (repo, report) = ops::init(&cli.repo, config)?;
            println!(
                "initialized stew project {} at {} (remote {})",
                name,
                repo.root().display(),
                remote
            );
            println!(
                "version {}, {} audio files will be added by the first pin",
                report.version, report.tracked
            );
        }

        Commands::Remote { url, project } => {
            let mut repo = Repo::open(&cli.repo)?;
            if let Some(url) = url {
                let project = match project {
                    Some(p) => p,
                    None => repo.config().remote()?.project.clone(),
                };
                repo.config_mut().set_remote(url, project);
                repo.save_config()?;
            }
            println!("{}", remote_url(&repo));
        }

        Commands::Pin { message, no_push } => {
            let repo = Repo::open(&cli.repo)?;
            let report = ops::pin_and_push(&repo, message.as_deref(), !no_push).await?;
            let pinned = &report.pinned;

            println!(
                "pinned version {} ({} added, {} removed)",
                pinned.version,
                pinned.count(ChangeKind::Added),
                pinned.count(ChangeKind::Removed)
            );
            match &report.remote {
                SyncStatus::Pushed => println!("pushed to {}", remote_url(&repo)),
                SyncStatus::Skipped => println!("not pushed; run `stew push` later"),
                SyncStatus::Failed(reason) => {
                    println!(
                        "warning: version {} is pinned locally but was not pushed: {}",
                        pinned.version, reason
                    );
                    println!("retry with `stew push {}`", pinned.version);
                }
            }
        }

        Commands::Push { version } => {
            let repo = Repo::open(&cli.repo)?;
            let version = match version {
                Some(v) => v,
                None => repo.read_version()?,
            };
            ops::push_version(&repo, version).await?;
            println!("pushed version {} to {}", version, remote_url(&repo));
        }

        Commands::Checkout { version, into } => {
            let repo = Repo::open(&cli.repo)?;
            let checkout = ops::checkout(&repo, version, into.as_deref()).await?;
            println!(
                "checked out version {} to {}",
                checkout.version,
                checkout.archive.display()
            );
            if let Some(dir) = into {
                println!("unpacked {} files into {}", checkout.extracted.len(), dir.display());
            }
        }

        Commands::Log { max_count } => {
            let repo = Repo::open(&cli.repo)?;
            for entry in ops::log(&repo, max_count)? {
                println!("{}", entry);
            }
        }

        Commands::Status => {
            let repo = Repo::open(&cli.repo)?;
            let status = ops::status(&repo)?;

            println!("on version {}", status.version);
            if status.is_clean() {
                println!("nothing to pin, working tree matches the current version");
            }
            for change in &status.changes {
                let prefix = match change.kind {
                    ChangeKind::Added => "+",
                    ChangeKind::Removed => "-",
                };
                println!("{} {}", prefix, change.file);
            }
        }

        Commands::Compare { old, new, out_dir } => {
            let report = compare_files(&old, &new, &out_dir)?;
            if report.diff.is_empty() {
                println!("no sample changes");
            }
            for artifact in &report.artifacts {
                println!("wrote {}", artifact.display());
            }
        }

        Commands::Patch { target, patches } => {
            apply_patches(&target, &patches)?;
            println!("applied {} patches to {}", patches.len(), target.display());
        }

        Commands::Server {
            port,
            data,
            shutdown_grace_secs,
            max_upload_mb,
        } => {
            let config = ServerConfig {
                listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
                data_dir: data,
                shutdown_grace: Duration::from_secs(shutdown_grace_secs),
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            };
            Server::new(config).run().await?;
        }
    }

    Ok(())
}

fn remote_url(repo: &Repo) -> String {
    repo.config()
        .remote()
        .map(|r| r.project_url())
        .unwrap_or_default()
}
