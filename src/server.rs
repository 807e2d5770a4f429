//! Request server process
//!
//! One of the N processes started by the supervisor. Every process binds the
//! same port with SO_REUSEPORT so the kernel spreads incoming connections
//! across them; a process that dies only takes its own connections along.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::net::TcpSocket;
use tokio::signal;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

/// In-flight requests get this long to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const LISTEN_BACKLOG: u32 = 1024;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid listen host {host:?}")]
    InvalidHost { host: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Bind a listener that other processes may bind to as well
pub fn bind_shared(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;

    socket.listen(LISTEN_BACKLOG)?.into_std()
}

/// Serve the router until SIGINT/SIGTERM
pub async fn run(config: &ServerConfig, state: AppState) -> Result<(), ServerError> {
    let ip: IpAddr = config.host.parse().map_err(|_| ServerError::InvalidHost {
        host: config.host.clone(),
    })?;
    let addr = SocketAddr::new(ip, config.port);

    let listener = bind_shared(addr).map_err(|source| ServerError::Bind { addr, source })?;
    let app = routes::router(state);

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal().await;
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let served = match &config.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(ServerError::Tls)?;
            tracing::info!(pid = std::process::id(), "Listening on https://{}", addr);

            axum_server::from_tcp_rustls(listener, rustls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            tracing::warn!("TLS_CERT_PATH/TLS_KEY_PATH not set, serving plaintext HTTP");
            tracing::info!(pid = std::process::id(), "Listening on http://{}", addr);

            axum_server::from_tcp(listener)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };
    served.map_err(ServerError::Serve)?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
