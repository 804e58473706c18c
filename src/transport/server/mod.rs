//! pin server: rest api over an on-disk object store

mod error;
mod routes;
mod store;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{error, info, warn};

pub use error::{Result, ServerError};
pub use routes::{build_router, AppState};
pub use store::{validate_name, ObjectStore, ProjectRecord};

use crate::error::IoResultExt;

pub const DEFAULT_PORT: u16 = 6969;
pub const DEFAULT_DATA_DIR: &str = "./stewdio-data";
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// server settings, built from cli flags
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// how long in-flight requests may run after a shutdown signal
    pub shutdown_grace: Duration,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

pub struct Server {
    config: ServerConfig,
    store: ObjectStore,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let store = ObjectStore::new(config.data_dir.clone());
        Self { config, store }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        build_router(
            AppState {
                store: self.store.clone(),
            },
            self.config.max_upload_bytes,
        )
    }

    /// bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.listen_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// serve until ctrl-c or sigterm
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.run_until(listener, shutdown_signal()).await
    }

    /// serve on `listener` until `signal` resolves, then drain in-flight
    /// requests for at most the grace period
    pub async fn run_until<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let data_dir = &self.config.data_dir;
        std::fs::create_dir_all(data_dir).with_path(data_dir)?;

        let addr = listener.local_addr().map_err(ServerError::Serve)?;
        info!(addr = %addr, data_dir = %data_dir.display(), "server listening");

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = self.router();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        tokio::select! {
            res = &mut server => return finished(res),
            _ = signal => {}
        }

        let grace = self.config.shutdown_grace;
        info!(grace = ?grace, "shutting down");
        let _ = stop_tx.send(());

        match tokio::time::timeout(grace, &mut server).await {
            Ok(res) => {
                info!("server stopped");
                finished(res)
            }
            Err(_) => {
                server.abort();
                error!(grace = ?grace, "in-flight requests outlived the shutdown grace period");
                Err(ServerError::ShutdownTimeout(grace))
            }
        }
    }
}

fn finished(res: std::result::Result<std::io::Result<()>, JoinError>) -> Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::Serve(e)),
        Err(e) => Err(ServerError::Serve(std::io::Error::other(e))),
    }
}

/// resolves on ctrl-c, or sigterm on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for sigterm");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
