//! Discovered-device registry.
//!
//! One entry per peer, keyed by fingerprint when the peer supplies one,
//! else by `address|alias|port`. Bounded in practice by LAN size.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use lanbeam_proto::VersionMessage;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub info: VersionMessage,
    pub address: IpAddr,
    pub last_seen: DateTime<Utc>,
}

#[derive(Default)]
pub struct DeviceRegistry {
    inner: RwLock<HashMap<String, DiscoveredDevice>>,
}

fn cache_key(info: &VersionMessage, address: IpAddr) -> String {
    if !info.fingerprint.is_empty() {
        info.fingerprint.clone()
    } else {
        format!("{address}|{}|{}", info.alias, info.port)
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or refresh a peer; a later sighting overwrites `last_seen`.
    pub fn upsert(&self, info: VersionMessage, address: IpAddr) {
        let key = cache_key(&info, address);
        let mut inner = self.inner.write();
        inner.insert(
            key,
            DiscoveredDevice {
                info,
                address,
                last_seen: Utc::now(),
            },
        );
    }

    /// Devices seen at or after `since`; all of them when `since` is None.
    pub fn list_since(&self, since: Option<DateTime<Utc>>) -> Vec<DiscoveredDevice> {
        let inner = self.inner.read();
        inner
            .values()
            .filter(|d| since.map_or(true, |s| d.last_seen >= s))
            .cloned()
            .collect()
    }

    /// Look a peer up by fingerprint, falling back to alias.
    pub fn find(&self, target: &str) -> Option<DiscoveredDevice> {
        let inner = self.inner.read();
        inner
            .values()
            .find(|d| d.info.fingerprint == target)
            .or_else(|| inner.values().find(|d| d.info.alias == target))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
