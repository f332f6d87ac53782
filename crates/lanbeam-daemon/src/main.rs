//! lanbeam — a LocalSend v2 peer daemon for the local network.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lanbeam_core::{DaemonConfig, ScanMode};
use lanbeam_daemon::{routes, state::AppState, tls};
use lanbeam_proto::Protocol;

#[derive(Parser, Debug)]
#[command(name = "lanbeam", version, about = "LocalSend v2 peer daemon")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device alias shown to peers.
    #[arg(long)]
    alias: Option<String>,

    /// HTTP(S) listening port.
    #[arg(long)]
    port: Option<u16>,

    /// Serving scheme: http or https.
    #[arg(long)]
    protocol: Option<String>,

    /// Require this 4-6 digit PIN on prepare-upload.
    #[arg(long)]
    pin: Option<String>,

    /// Multicast group address.
    #[arg(long)]
    multicast_group: Option<Ipv4Addr>,

    /// Multicast port.
    #[arg(long)]
    multicast_port: Option<u16>,

    /// Restrict discovery to interfaces with this name prefix.
    #[arg(long)]
    interface: Option<String>,

    /// Directory received files land in.
    #[arg(long)]
    upload_root: Option<PathBuf>,

    /// Advertise the download (reverse transfer) capability bit.
    #[arg(long)]
    download: Option<bool>,

    /// Discovery mode: udp, http or mixed.
    #[arg(long)]
    scan_mode: Option<String>,

    /// Overall sweep probe timeout in seconds.
    #[arg(long)]
    scan_timeout: Option<u64>,

    /// Webhook URL for upload_start/upload_end notifications.
    #[arg(long)]
    webhook_url: Option<String>,

    /// Log mode: dev (debug) or prod (info).
    #[arg(long)]
    log: Option<String>,
}

impl Cli {
    fn apply_to(&self, config: &mut DaemonConfig) -> anyhow::Result<()> {
        if let Some(alias) = &self.alias {
            config.alias = alias.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(protocol) = &self.protocol {
            config.protocol = match protocol.as_str() {
                "http" => Protocol::Http,
                "https" => Protocol::Https,
                other => anyhow::bail!("unknown protocol: {other}"),
            };
        }
        if let Some(pin) = &self.pin {
            config.pin = Some(pin.clone());
        }
        if let Some(group) = self.multicast_group {
            config.multicast_group = group;
        }
        if let Some(port) = self.multicast_port {
            config.multicast_port = port;
        }
        if let Some(interface) = &self.interface {
            config.interface = Some(interface.clone());
        }
        if let Some(root) = &self.upload_root {
            config.upload_root = root.clone();
        }
        if let Some(download) = self.download {
            config.download = download;
        }
        if let Some(mode) = &self.scan_mode {
            config.scan_mode = mode.parse::<ScanMode>()?;
        }
        if let Some(timeout) = self.scan_timeout {
            config.scan_timeout_secs = timeout;
        }
        if let Some(url) = &self.webhook_url {
            config.webhook_url = Some(url.clone());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.log.as_deref() {
        Some("dev") => "debug",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut config)?;
    config.finalize()?;

    info!(
        alias = %config.alias,
        fingerprint = %config.fingerprint,
        port = config.port,
        protocol = config.protocol.scheme(),
        uploads = %config.upload_root.display(),
        "starting lanbeam"
    );

    let state = AppState::new(config.clone())?;

    // Discovery sockets bind here; failure is fatal by design.
    state.discovery.start().await?;

    let app = routes::build_router(state.clone());
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));

    match config.protocol {
        Protocol::Http => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("cannot bind {addr}"))?;
            info!(%addr, "API server listening");
            axum::serve(listener, service)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server failed")?;
        }
        Protocol::Https => {
            let material = tls::generate_self_signed().context("TLS material generation")?;
            let rustls_config = RustlsConfig::from_pem(
                material.cert_pem.into_bytes(),
                material.key_pem.into_bytes(),
            )
            .await
            .context("TLS config")?;
            info!(%addr, "API server listening (https, self-signed)");

            let handle = axum_server::Handle::new();
            {
                let handle = handle.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    handle.graceful_shutdown(Some(Duration::from_secs(5)));
                });
            }
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(service)
                .await
                .context("server failed")?;
        }
    }

    state.discovery.shutdown().await;
    info!("lanbeam stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("stop signal received");
}
