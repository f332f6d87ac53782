//! The discovery engine: announcement and listener loops, sweep fallback,
//! and the mutual-announce handshake.
//!
//! Every long-lived loop holds a cancellation token; `shutdown` cancels
//! them all and awaits completion. Network failures inside the loops are
//! logged and never propagate — only socket construction at startup is
//! allowed to fail the daemon.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lanbeam_core::{Error, Result, ScanMode};
use lanbeam_proto::{parse_version_message, PeerEndpoint, Protocol, VersionMessage};
use lanbeam_session::DeviceRegistry;

use crate::multicast;
use crate::netif;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    pub scan_mode: ScanMode,
    pub announce_interval: Duration,
    pub sweep_interval: Duration,
    pub scan_timeout: Duration,
    pub scan_connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Interface name prefix restriction; `None` means all eligible.
    pub interface: Option<String>,
}

pub struct DiscoveryEngine {
    self_info: VersionMessage,
    registry: Arc<DeviceRegistry>,
    config: DiscoveryConfig,
    /// Client for mutual-announce register callbacks.
    client: reqwest::Client,
    /// Short-timeout client for sweep probes, so dead addresses fail fast.
    scan_client: reqwest::Client,
    scan_tx: mpsc::Sender<()>,
    scan_rx: Mutex<Option<mpsc::Receiver<()>>>,
    restart_tx: mpsc::Sender<()>,
    restart_rx: Mutex<Option<mpsc::Receiver<()>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryEngine {
    pub fn new(
        self_info: VersionMessage,
        registry: Arc<DeviceRegistry>,
        config: DiscoveryConfig,
    ) -> Result<Arc<Self>> {
        // Peers use self-signed certificates; never validate them.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("http client: {e}")))?;
        let scan_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.scan_timeout)
            .connect_timeout(config.scan_connect_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("scan client: {e}")))?;

        let (scan_tx, scan_rx) = mpsc::channel(1);
        let (restart_tx, restart_rx) = mpsc::channel(1);

        Ok(Arc::new(Self {
            self_info,
            registry,
            config,
            client,
            scan_client,
            scan_tx,
            scan_rx: Mutex::new(Some(scan_rx)),
            restart_tx,
            restart_rx: Mutex::new(Some(restart_rx)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Spawn the loops selected by the scan mode. Socket construction
    /// happens here so bind failures are fatal to the caller.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut tasks = self.tasks.lock().await;

        if matches!(self.config.scan_mode, ScanMode::Udp | ScanMode::Mixed) {
            let interfaces = netif::eligible_ipv4_addrs(self.config.interface.as_deref());
            let listener =
                multicast::listener_socket(self.config.group, self.config.port, &interfaces)?;
            let announcer = multicast::sender_socket().await?;
            info!(
                group = %self.config.group,
                port = self.config.port,
                interfaces = interfaces.len(),
                "multicast discovery up"
            );

            let this = Arc::clone(self);
            tasks.push(tokio::spawn(this.run_listener(listener)));
            let this = Arc::clone(self);
            tasks.push(tokio::spawn(this.run_announcer(announcer)));
        }

        if matches!(self.config.scan_mode, ScanMode::Http | ScanMode::Mixed) {
            let restart_rx = self
                .restart_rx
                .lock()
                .await
                .take()
                .expect("sweep loop started twice");
            let this = Arc::clone(self);
            tasks.push(tokio::spawn(this.run_sweep_loop(restart_rx)));
        }

        let scan_rx = self
            .scan_rx
            .lock()
            .await
            .take()
            .expect("scan worker started twice");
        let this = Arc::clone(self);
        tasks.push(tokio::spawn(this.run_scan_worker(scan_rx)));

        Ok(())
    }

    /// Request an immediate sweep. Non-blocking: a request arriving while
    /// one is already pending or running is coalesced into it.
    pub fn scan_now(&self) {
        match self.scan_tx.try_send(()) {
            Ok(()) => debug!("manual scan queued"),
            Err(_) => debug!("manual scan already pending"),
        }
    }

    /// Cancel every loop and await completion.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        info!("discovery stopped");
    }

    /// Filter and record one announcement. Returns true when the message
    /// asks for a reply: `announce=true` from a device that is not us.
    /// `announce=false` messages update the registry but are never
    /// countered, which is what prevents reply storms.
    fn accept_message(&self, msg: &VersionMessage, source: IpAddr) -> bool {
        if msg.fingerprint == self.self_info.fingerprint {
            return false;
        }
        self.registry.upsert(msg.clone(), source);
        msg.announce
    }

    async fn run_listener(self: Arc<Self>, socket: UdpSocket) {
        let mut buf = vec![0u8; multicast::MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => Self::handle_datagram(&self, &buf[..len], src),
                    Err(err) => {
                        warn!(error = %err, "multicast receive failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
    }

    fn handle_datagram(this: &Arc<Self>, data: &[u8], src: SocketAddr) {
        let msg = match parse_version_message(data) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(from = %src, error = %err, "undecodable datagram");
                return;
            }
        };
        let SocketAddr::V4(src_v4) = src else { return };
        if this.accept_message(&msg, IpAddr::V4(*src_v4.ip())) {
            debug!(from = %src, alias = %msg.alias, "announcement received");
            let engine = Arc::clone(this);
            let peer_ip = *src_v4.ip();
            tokio::spawn(async move { engine.mutual_announce(msg, peer_ip).await });
        }
    }

    /// Reply to an announcement: register over HTTP, and when the peer is
    /// unreachable that way, fall back to a single `announce=false`
    /// datagram on the group.
    async fn mutual_announce(&self, peer: VersionMessage, peer_ip: Ipv4Addr) {
        let endpoint = PeerEndpoint::new(peer_ip, peer.port, peer.protocol);
        match self.post_register(&endpoint).await {
            Ok(()) => debug!(peer = %peer.alias, "registered with peer"),
            Err(err) => {
                warn!(peer = %peer.alias, error = %err, "register callback failed, replying over UDP");
                if let Err(udp_err) = self.udp_reply_once().await {
                    warn!(error = %udp_err, "UDP fallback reply failed");
                }
            }
        }
    }

    async fn post_register(&self, endpoint: &PeerEndpoint) -> Result<()> {
        let response = self
            .client
            .post(endpoint.register_url())
            .json(&self.self_info)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "register returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn udp_reply_once(&self) -> Result<()> {
        let socket = multicast::sender_socket().await?;
        let reply = self.self_info.as_reply();
        let payload = serde_json::to_vec(&reply)?;
        let dest = SocketAddr::from((self.config.group, self.config.port));
        socket
            .send_to(&payload, dest)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(())
    }

    async fn run_announcer(self: Arc<Self>, socket: UdpSocket) {
        let dest = SocketAddr::from((self.config.group, self.config.port));
        loop {
            match serde_json::to_vec(&self.self_info) {
                Ok(payload) => {
                    if let Err(err) = socket.send_to(&payload, dest).await {
                        warn!(error = %err, "announcement send failed");
                    }
                }
                Err(err) => warn!(error = %err, "announcement encode failed"),
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.announce_interval) => {}
            }
        }
    }

    async fn run_sweep_loop(self: Arc<Self>, mut restart_rx: mpsc::Receiver<()>) {
        self.sweep_once().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                // A finished manual sweep resets the cadence.
                Some(()) = restart_rx.recv() => continue,
                _ = tokio::time::sleep(self.config.sweep_interval) => self.sweep_once().await,
            }
        }
    }

    async fn run_scan_worker(self: Arc<Self>, mut scan_rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                request = scan_rx.recv() => match request {
                    Some(()) => {
                        info!("manual scan running");
                        self.sweep_once().await;
                        let _ = self.restart_tx.try_send(());
                    }
                    None => break,
                },
            }
        }
    }

    /// One HTTP sweep over the local addresses: post our announcement to
    /// each `/register` and record peers that answer with their own.
    async fn sweep_once(&self) {
        let targets = netif::eligible_ipv4_addrs(self.config.interface.as_deref());
        if targets.is_empty() {
            debug!("sweep skipped, no usable local addresses");
            return;
        }
        let probes = targets.into_iter().map(|ip| self.probe(ip));
        futures::future::join_all(probes).await;
    }

    async fn probe(&self, target: Ipv4Addr) {
        let endpoint = PeerEndpoint::new(target, self.config.port, Protocol::Http);
        let response = match self
            .scan_client
            .post(endpoint.register_url())
            .json(&self.self_info)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(%target, status = %response.status(), "sweep probe rejected");
                return;
            }
            Err(err) => {
                debug!(%target, error = %err, "sweep probe failed");
                return;
            }
        };

        match response.bytes().await {
            Ok(body) => {
                if let Ok(peer) = parse_version_message(&body) {
                    if peer.fingerprint != self.self_info.fingerprint
                        && !peer.fingerprint.is_empty()
                    {
                        info!(alias = %peer.alias, %target, "peer found by sweep");
                        self.registry.upsert(peer, IpAddr::V4(target));
                    }
                }
            }
            Err(err) => debug!(%target, error = %err, "sweep response unreadable"),
        }
    }
}
