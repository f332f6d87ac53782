//! LocalSend v2 protocol types.
//!
//! All messages are camelCase JSON. Unknown outer fields are ignored on
//! input for forward compatibility; `deviceType` and `protocol` are closed
//! enums and reject values outside the protocol's vocabulary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Protocol version.
pub const PROTOCOL_VERSION: &str = "2.0";
/// Standard LocalSend port (UDP multicast and HTTP).
pub const DEFAULT_PORT: u16 = 53317;
/// Multicast group address.
pub const MULTICAST_GROUP: &str = "224.0.0.167";
/// Base path of the v2 HTTP API.
pub const API_BASE: &str = "/api/localsend/v2";

/// Device category advertised in announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Web,
    Headless,
    Server,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Desktop
    }
}

/// Transport scheme a device serves its API over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Http
    }
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Announcement record broadcast over multicast and posted to `/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMessage {
    pub alias: String,
    pub version: String,
    #[serde(rename = "deviceModel", skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(rename = "deviceType", default)]
    pub device_type: DeviceType,
    pub fingerprint: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub download: bool,
    #[serde(default)]
    pub announce: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl VersionMessage {
    /// Copy of this message marked as a reply (`announce=false`), which a
    /// receiver must never counter-announce.
    pub fn as_reply(&self) -> VersionMessage {
        let mut reply = self.clone();
        reply.announce = false;
        reply
    }

    /// The `info` block used in a prepare-upload request.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            alias: self.alias.clone(),
            version: self.version.clone(),
            device_model: self.device_model.clone(),
            device_type: self.device_type,
            fingerprint: self.fingerprint.clone(),
            port: self.port,
            protocol: self.protocol,
            download: self.download,
        }
    }
}

/// Sender identity in a prepare-upload request: an announcement without
/// the `announce` bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub alias: String,
    pub version: String,
    #[serde(rename = "deviceModel", skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(rename = "deviceType", default)]
    pub device_type: DeviceType,
    pub fingerprint: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub download: bool,
}

/// Optional file timestamps, ISO-8601 strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<String>,
}

/// Metadata for one file offered in a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub size: u64,
    #[serde(rename = "fileType")]
    pub file_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
}

/// Prepare-upload request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareUploadRequest {
    pub info: DeviceInfo,
    pub files: HashMap<String, FileInfo>,
}

/// Prepare-upload response: the minted session plus one token per
/// accepted file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareUploadResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub files: HashMap<String, String>,
}

/// Webhook notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Parse an announcement from a datagram or request body.
pub fn parse_version_message(body: &[u8]) -> Result<VersionMessage, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Parse a prepare-upload request body.
pub fn parse_prepare_upload(body: &[u8]) -> Result<PrepareUploadRequest, serde_json::Error> {
    serde_json::from_slice(body)
}
