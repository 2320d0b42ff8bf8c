pub mod api;

use crate::cli::ServeArgs;
use crate::llm::chat::BoxError;
use crate::relay::Relay;
use self::api::AppState;
use axum_server::tls_rustls::RustlsConfig;
use log::{ info, error };
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Server {
    addr: String,
    relay: Relay,
    args: ServeArgs,
}

impl Server {
    pub fn new(addr: String, relay: Relay, args: ServeArgs) -> Self {
        Self { addr, relay, args }
    }

    pub async fn run(&self) -> Result<(), BoxError> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = api::router(AppState { relay: self.relay.clone() });

        if !self.args.enable_tls {
            info!("TLS not enabled. Running plain HTTP server.");
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;
            info!("HTTP server listening on: http://{}", listener.local_addr()?);
            axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
            info!("HTTP server stopped");
            return Ok(());
        }

        let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => (cert_path, key_path),
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        };

        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let _ = rustls::crypto::ring::default_provider().install_default();
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path).await?;

        let handle = axum_server::Handle::new();
        let shutdown = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!("HTTPS server listening on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service()).await?;
        info!("HTTPS server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
