//! Shared application state.
//!
//! Everything the daemon owns, built once in `main` and passed by `Arc`
//! into request handlers and background loops. There is no global state.

use std::sync::Arc;

use lanbeam_core::{DaemonConfig, Result};
use lanbeam_discovery::{DiscoveryConfig, DiscoveryEngine};
use lanbeam_proto::VersionMessage;
use lanbeam_session::{
    AdmissionPolicy, DeviceRegistry, ReceiverEngine, SessionStore, TransferHooks,
};

use crate::sender::Sender;
use crate::webhook::WebhookNotifier;

pub struct AppState {
    pub config: DaemonConfig,
    pub self_info: VersionMessage,
    pub store: Arc<SessionStore>,
    pub registry: Arc<DeviceRegistry>,
    pub receiver: ReceiverEngine,
    pub sender: Sender,
    pub discovery: Arc<DiscoveryEngine>,
}

impl AppState {
    pub fn new(config: DaemonConfig) -> Result<Arc<Self>> {
        let self_info = config.version_message();
        let store = Arc::new(SessionStore::new(config.session_ttl()));
        let registry = Arc::new(DeviceRegistry::new());

        let hooks: Arc<dyn TransferHooks> =
            Arc::new(WebhookNotifier::new(config.webhook_url.clone())?);
        let receiver = ReceiverEngine::new(
            config.fingerprint.clone(),
            AdmissionPolicy {
                pin: config.pin.clone(),
                accept_transfers: config.accept_transfers,
                max_active_sessions: 1,
                check_sender_ip: config.check_sender_ip,
            },
            Arc::clone(&store),
            Arc::clone(&registry),
            config.upload_root.clone(),
            hooks,
        );

        let sender = Sender::new(self_info.device_info(), config.request_timeout())?;

        let discovery = DiscoveryEngine::new(
            self_info.clone(),
            Arc::clone(&registry),
            DiscoveryConfig {
                group: config.multicast_group,
                port: config.multicast_port,
                scan_mode: config.scan_mode,
                announce_interval: config.announce_interval(),
                sweep_interval: config.sweep_interval(),
                scan_timeout: config.scan_timeout(),
                scan_connect_timeout: config.scan_connect_timeout(),
                request_timeout: config.request_timeout(),
                interface: config.interface.clone(),
            },
        )?;

        Ok(Arc::new(Self {
            config,
            self_info,
            store,
            registry,
            receiver,
            sender,
            discovery,
        }))
    }
}
