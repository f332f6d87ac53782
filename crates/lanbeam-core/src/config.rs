//! Daemon configuration.
//!
//! Configuration is layered: built-in defaults, then an optional JSON
//! config file, then CLI overrides applied by the binary. The merged
//! record is the single typed source of truth handed to every subsystem.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use lanbeam_proto::{DeviceType, Protocol, VersionMessage, DEFAULT_PORT, PROTOCOL_VERSION};

use crate::error::{Error, Result};

/// Discovery scanning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// UDP multicast only.
    Udp,
    /// HTTP sweep only (legacy).
    Http,
    /// Both loops, independently.
    Mixed,
}

impl std::str::FromStr for ScanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "udp" => Ok(ScanMode::Udp),
            "http" => Ok(ScanMode::Http),
            "mixed" => Ok(ScanMode::Mixed),
            other => Err(Error::Config(format!("unknown scan mode: {other}"))),
        }
    }
}

/// Merged daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub alias: String,
    pub device_model: Option<String>,
    pub device_type: DeviceType,
    /// Opaque node id; derived from alias+hostname when left empty.
    pub fingerprint: String,
    pub port: u16,
    pub protocol: Protocol,
    pub pin: Option<String>,
    /// Refuse every inbound transfer when false.
    pub accept_transfers: bool,
    pub download: bool,
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    /// When set, only interfaces whose name starts with this prefix are
    /// used for multicast joins and sweep targets. `*` means all.
    pub interface: Option<String>,
    pub upload_root: PathBuf,
    pub scan_mode: ScanMode,
    pub announce_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub scan_timeout_secs: u64,
    pub scan_connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub session_ttl_secs: u64,
    /// Bind upload tokens to the address recorded at prepare time.
    pub check_sender_ip: bool,
    pub webhook_url: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            alias: hostname(),
            device_model: None,
            device_type: DeviceType::Headless,
            fingerprint: String::new(),
            port: DEFAULT_PORT,
            protocol: Protocol::Http,
            pin: None,
            accept_transfers: true,
            download: false,
            multicast_group: Ipv4Addr::new(224, 0, 0, 167),
            multicast_port: DEFAULT_PORT,
            interface: None,
            upload_root: PathBuf::from("uploads"),
            scan_mode: ScanMode::Mixed,
            announce_interval_secs: 5,
            sweep_interval_secs: 30,
            scan_timeout_secs: 5,
            scan_connect_timeout_secs: 3,
            request_timeout_secs: 30,
            session_ttl_secs: 3600,
            check_sender_ip: true,
            webhook_url: None,
        }
    }
}

/// On-disk config file shape: every field optional, camelCase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub alias: Option<String>,
    pub device_model: Option<String>,
    pub device_type: Option<DeviceType>,
    pub fingerprint: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub pin: Option<String>,
    pub accept_transfers: Option<bool>,
    pub download: Option<bool>,
    pub multicast_group: Option<Ipv4Addr>,
    pub multicast_port: Option<u16>,
    pub interface: Option<String>,
    pub upload_root: Option<PathBuf>,
    pub scan_mode: Option<ScanMode>,
    pub announce_interval_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub scan_timeout_secs: Option<u64>,
    pub scan_connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub session_ttl_secs: Option<u64>,
    pub check_sender_ip: Option<bool>,
    pub webhook_url: Option<String>,
}

impl DaemonConfig {
    /// Defaults overlaid with a config file, when one is given.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = config_path {
            let data = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("cannot read config {}: {e}", path.display()))
            })?;
            let file: ConfigFile = serde_json::from_str(&data)
                .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
            config.apply_file(file);
        }
        Ok(config)
    }

    pub fn apply_file(&mut self, file: ConfigFile) {
        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(value) = file.$field { self.$field = value; })+
            };
        }
        overlay!(
            alias,
            device_type,
            fingerprint,
            port,
            protocol,
            accept_transfers,
            download,
            multicast_group,
            multicast_port,
            upload_root,
            scan_mode,
            announce_interval_secs,
            sweep_interval_secs,
            scan_timeout_secs,
            scan_connect_timeout_secs,
            request_timeout_secs,
            session_ttl_secs,
            check_sender_ip,
        );
        if file.device_model.is_some() {
            self.device_model = file.device_model;
        }
        if file.pin.is_some() {
            self.pin = file.pin;
        }
        if file.interface.is_some() {
            self.interface = file.interface;
        }
        if file.webhook_url.is_some() {
            self.webhook_url = file.webhook_url;
        }
    }

    /// Validate and finalize: derive a fingerprint when none is set,
    /// check the PIN shape, create the upload root.
    pub fn finalize(&mut self) -> Result<()> {
        if self.fingerprint.is_empty() {
            self.fingerprint = derive_fingerprint(&self.alias);
        }
        if let Some(pin) = &self.pin {
            if pin.len() < 4 || pin.len() > 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::Config("pin must be 4-6 digits".to_string()));
            }
        }
        std::fs::create_dir_all(&self.upload_root)
            .map_err(|e| Error::Config(format!("cannot create upload root: {e}")))?;
        Ok(())
    }

    /// The announcement this node broadcasts about itself.
    pub fn version_message(&self) -> VersionMessage {
        VersionMessage {
            alias: self.alias.clone(),
            version: PROTOCOL_VERSION.to_string(),
            device_model: self.device_model.clone(),
            device_type: self.device_type,
            fingerprint: self.fingerprint.clone(),
            port: self.port,
            protocol: self.protocol,
            download: self.download,
            announce: true,
            address: None,
        }
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn scan_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "lanbeam".to_string())
}

/// Derive a stable device fingerprint from the alias and host identity.
pub fn derive_fingerprint(alias: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(alias.as_bytes());
    hasher.update(hostname().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
