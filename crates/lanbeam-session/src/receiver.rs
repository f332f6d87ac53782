//! Receiver-side session engine.
//!
//! Owns admission control for `prepare-upload`, session and token
//! minting, the streaming upload sink with size and SHA-256 verification,
//! and idempotent cancellation. Side-band events (registration, upload
//! start/end, cancel) go through the [`TransferHooks`] capability so the
//! HTTP layer never carries notification wiring itself.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lanbeam_core::{Error, Result};
use lanbeam_proto::{FileInfo, PrepareUploadRequest, PrepareUploadResponse, VersionMessage};

use crate::registry::DeviceRegistry;
use crate::store::{SessionEntry, SessionStore};

const MAX_PIN_FAILURES: u32 = 3;
const PIN_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// A transfer event handed to hooks.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub session_id: String,
    pub file_id: String,
    pub file: FileInfo,
}

/// Side-band observer for transfer lifecycle events.
#[async_trait]
pub trait TransferHooks: Send + Sync {
    async fn on_register(&self, _peer: &VersionMessage) {}
    async fn on_upload_started(&self, _event: &TransferEvent) {}
    async fn on_upload_finished(&self, _event: &TransferEvent) {}
    async fn on_session_canceled(&self, _session_id: &str) {}
}

/// Hooks that do nothing.
pub struct NoopHooks;

#[async_trait]
impl TransferHooks for NoopHooks {}

/// What the receiver admits and enforces.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub pin: Option<String>,
    /// Reject every prepare-upload when false.
    pub accept_transfers: bool,
    /// Ceiling on concurrently active sessions.
    pub max_active_sessions: usize,
    /// Bind uploads to the address seen at prepare time.
    pub check_sender_ip: bool,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            pin: None,
            accept_transfers: true,
            max_active_sessions: 1,
            check_sender_ip: true,
        }
    }
}

struct PinFailures {
    count: u32,
    since: Instant,
}

pub struct ReceiverEngine {
    fingerprint: String,
    policy: AdmissionPolicy,
    store: Arc<SessionStore>,
    registry: Arc<DeviceRegistry>,
    upload_root: PathBuf,
    hooks: Arc<dyn TransferHooks>,
    pin_failures: Mutex<HashMap<IpAddr, PinFailures>>,
}

impl ReceiverEngine {
    pub fn new(
        fingerprint: String,
        policy: AdmissionPolicy,
        store: Arc<SessionStore>,
        registry: Arc<DeviceRegistry>,
        upload_root: PathBuf,
        hooks: Arc<dyn TransferHooks>,
    ) -> Self {
        Self {
            fingerprint,
            policy,
            store,
            registry,
            upload_root,
            hooks,
            pin_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Handle a peer announcement delivered over HTTP `/register`.
    /// Messages carrying our own fingerprint are dropped.
    pub async fn register_peer(&self, peer: VersionMessage, remote: IpAddr) {
        if peer.fingerprint == self.fingerprint {
            debug!("ignoring register from self");
            return;
        }
        info!(
            alias = %peer.alias,
            fingerprint = %peer.fingerprint,
            port = peer.port,
            "peer registered"
        );
        self.registry.upsert(peer.clone(), remote);
        self.hooks.on_register(&peer).await;
    }

    /// Admission control and session minting for `prepare-upload`.
    pub async fn prepare_upload(
        &self,
        request: PrepareUploadRequest,
        pin: Option<&str>,
        remote: IpAddr,
    ) -> Result<PrepareUploadResponse> {
        if !self.policy.accept_transfers {
            return Err(Error::Rejected);
        }
        self.check_pin(pin, remote)?;
        if self.store.has_active_for(&request.info.fingerprint)
            || self.store.active_count() >= self.policy.max_active_sessions
        {
            return Err(Error::SessionBlocked);
        }
        if request.files.is_empty() {
            return Err(Error::BadRequest);
        }

        let session_id = Uuid::new_v4().to_string();
        let tokens: HashMap<String, String> = request
            .files
            .keys()
            .map(|file_id| (file_id.clone(), Uuid::new_v4().simple().to_string()))
            .collect();

        self.store.insert(
            &session_id,
            SessionEntry {
                files: request.files,
                tokens: tokens.clone(),
                sender_fingerprint: request.info.fingerprint.clone(),
                sender_address: remote,
            },
        );

        info!(
            session = %session_id,
            from = %request.info.alias,
            files = tokens.len(),
            "transfer session created"
        );

        Ok(PrepareUploadResponse {
            session_id,
            files: tokens,
        })
    }

    /// Stream one file to disk, verifying size and SHA-256.
    ///
    /// The first upload of a session runs the full validity check and
    /// sets the validated fast-path flag; later uploads skip straight to
    /// token validation.
    pub async fn upload<S>(
        &self,
        session_id: &str,
        file_id: &str,
        token: &str,
        remote: IpAddr,
        body: S,
    ) -> Result<()>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin + Send,
    {
        if !self.store.is_validated(session_id) {
            if !self.store.session_exists(session_id) {
                return Err(Error::UnknownSession);
            }
            self.store.mark_validated(session_id);
        }

        let info = self.store.begin_upload(
            session_id,
            file_id,
            token,
            remote,
            self.policy.check_sender_ip,
        )?;

        let event = TransferEvent {
            session_id: session_id.to_string(),
            file_id: file_id.to_string(),
            file: info.clone(),
        };
        self.hooks.on_upload_started(&event).await;

        let target = self.target_path(session_id, file_id, &info.file_name);
        let outcome = receive_file(&target, &info, body).await;

        match outcome {
            Ok(written) => {
                let complete = self.store.finish_upload(session_id, file_id);
                info!(
                    session = %session_id,
                    file = %file_id,
                    bytes = written,
                    path = %target.display(),
                    "upload saved"
                );
                self.hooks.on_upload_finished(&event).await;
                if complete {
                    info!(session = %session_id, "all files received, session complete");
                }
                Ok(())
            }
            Err(err) => {
                self.store.abort_upload(session_id, file_id);
                if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                    debug!(
                        path = %target.display(),
                        error = %remove_err,
                        "partial file not removed"
                    );
                }
                warn!(session = %session_id, file = %file_id, error = %err, "upload rejected");
                Err(err)
            }
        }
    }

    /// Purge a session. Idempotent: canceling an unknown session is fine.
    /// Files already received stay on disk under the session directory.
    pub async fn cancel(&self, session_id: &str) {
        self.store.destroy(session_id);
        info!(session = %session_id, "session canceled");
        self.hooks.on_session_canceled(session_id).await;
    }

    fn target_path(&self, session_id: &str, file_id: &str, file_name: &str) -> PathBuf {
        let base = sanitize_file_name(file_name, file_id);
        self.upload_root
            .join(session_id)
            .join(format!("{file_id}_{base}"))
    }

    fn check_pin(&self, supplied: Option<&str>, remote: IpAddr) -> Result<()> {
        let Some(expected) = self.policy.pin.as_deref() else {
            return Ok(());
        };

        let mut failures = self.pin_failures.lock();
        if let Some(window) = failures.get(&remote) {
            if window.since.elapsed() > PIN_FAILURE_WINDOW {
                failures.remove(&remote);
            }
        }
        if failures
            .get(&remote)
            .map_or(false, |w| w.count >= MAX_PIN_FAILURES)
        {
            return Err(Error::TooManyRequests);
        }

        match supplied {
            None | Some("") => Err(Error::PinRequired),
            Some(pin) if pin == expected => {
                failures.remove(&remote);
                Ok(())
            }
            Some(_) => {
                failures
                    .entry(remote)
                    .and_modify(|w| w.count += 1)
                    .or_insert(PinFailures {
                        count: 1,
                        since: Instant::now(),
                    });
                Err(Error::InvalidPin)
            }
        }
    }
}

/// Strip any path components; an empty result falls back to the file id.
fn sanitize_file_name(name: &str, file_id: &str) -> String {
    let base = name
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .to_string();
    if base.is_empty() {
        file_id.to_string()
    } else {
        base
    }
}

/// Write the body to `target` while hashing, then verify size and digest.
async fn receive_file<S>(target: &Path, info: &FileInfo, mut body: S) -> Result<u64>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin + Send,
{
    if let Some(dir) = target.parent() {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder.create(dir).await?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);
    let mut file = options.open(target).await?;

    let mut hasher = Sha256::new();
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if info.size > 0 && written != info.size {
        return Err(Error::SizeMismatch);
    }
    if let Some(expected) = info.sha256.as_deref() {
        if !expected.is_empty() {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::HashMismatch);
            }
        }
    }
    Ok(written)
}
