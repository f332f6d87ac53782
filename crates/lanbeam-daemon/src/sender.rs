//! Sender engine: negotiate a session with a peer and stream files to it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use lanbeam_core::{Error, Result};
use lanbeam_proto::{
    DeviceInfo, FileInfo, FileMetadata, PeerEndpoint, PrepareUploadRequest, PrepareUploadResponse,
};

/// Fallback MIME tag when the caller does not supply one.
const OCTET_STREAM: &str = "application/octet-stream";

/// A file prepared for sending: its wire metadata plus the disk path.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub info: FileInfo,
    pub path: PathBuf,
}

/// What a completed send did.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// None when the receiver answered 204 (nothing to transfer).
    pub session_id: Option<String>,
    pub files_sent: Vec<String>,
}

/// Stat and hash a file on disk, producing its transfer metadata.
pub async fn collect_file(path: &Path, file_type: Option<&str>) -> Result<OutgoingFile> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::NotFound(path.display().to_string()))?;
    if !meta.is_file() {
        return Err(Error::BadRequest);
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    let sha256 = hex::encode(hasher.finalize());

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();
    let metadata = FileMetadata {
        modified: meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
        accessed: meta
            .accessed()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
    };

    Ok(OutgoingFile {
        info: FileInfo {
            id: Uuid::new_v4().simple().to_string(),
            file_name,
            size: meta.len(),
            file_type: file_type.unwrap_or(OCTET_STREAM).to_string(),
            sha256: Some(sha256),
            preview: None,
            metadata: Some(metadata),
        },
        path: path.to_path_buf(),
    })
}

pub struct Sender {
    /// Client for prepare/cancel, bounded by the request timeout.
    client: reqwest::Client,
    /// Upload client: connect timeout only, large bodies take as long as
    /// they take.
    upload_client: reqwest::Client,
    self_device: DeviceInfo,
}

impl Sender {
    pub fn new(self_device: DeviceInfo, request_timeout: Duration) -> Result<Self> {
        // Peers present self-signed certificates by design.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("http client: {e}")))?;
        let upload_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("upload client: {e}")))?;
        Ok(Self {
            client,
            upload_client,
            self_device,
        })
    }

    /// Negotiate a session and upload every accepted file. A failed
    /// upload aborts the transfer and best-effort cancels the session.
    pub async fn send_files(
        &self,
        peer: &PeerEndpoint,
        files: Vec<OutgoingFile>,
        pin: Option<&str>,
    ) -> Result<TransferReport> {
        let request = PrepareUploadRequest {
            info: self.self_device.clone(),
            files: files
                .iter()
                .map(|f| (f.info.id.clone(), f.info.clone()))
                .collect(),
        };

        let response = self
            .client
            .post(peer.prepare_upload_url(pin))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("prepare-upload: {e}")))?;

        match response.status().as_u16() {
            200 => {}
            204 => {
                info!("peer declined transfer, nothing to send");
                return Ok(TransferReport {
                    session_id: None,
                    files_sent: Vec::new(),
                });
            }
            400 => return Err(Error::BadRequest),
            401 => return Err(Error::PinRequired),
            403 => return Err(Error::Rejected),
            409 => return Err(Error::SessionBlocked),
            429 => return Err(Error::TooManyRequests),
            500 => return Err(Error::Internal("receiver error".to_string())),
            other => {
                return Err(Error::Transport(format!(
                    "prepare-upload returned {other}"
                )))
            }
        }

        let accepted: PrepareUploadResponse = response
            .json()
            .await
            .map_err(|_| Error::Internal("unparseable prepare-upload response".to_string()))?;
        if accepted.session_id.is_empty() {
            return Err(Error::Internal(
                "prepare-upload response missing sessionId".to_string(),
            ));
        }
        if accepted.files.is_empty() {
            return Err(Error::Internal(
                "prepare-upload response missing files".to_string(),
            ));
        }

        let by_id: HashMap<&str, &OutgoingFile> = files
            .iter()
            .map(|f| (f.info.id.as_str(), f))
            .collect();

        let mut files_sent = Vec::new();
        for (file_id, token) in &accepted.files {
            // The receiver may accept a subset of what we offered.
            let Some(outgoing) = by_id.get(file_id.as_str()) else {
                warn!(file = %file_id, "peer issued a token for a file we never offered");
                continue;
            };
            if let Err(err) = self
                .upload_one(peer, &accepted.session_id, file_id, token, outgoing)
                .await
            {
                warn!(file = %file_id, error = %err, "upload failed, canceling session");
                self.cancel(peer, &accepted.session_id).await;
                return Err(err);
            }
            files_sent.push(file_id.clone());
        }

        info!(
            session = %accepted.session_id,
            files = files_sent.len(),
            "transfer complete"
        );
        Ok(TransferReport {
            session_id: Some(accepted.session_id),
            files_sent,
        })
    }

    async fn upload_one(
        &self,
        peer: &PeerEndpoint,
        session_id: &str,
        file_id: &str,
        token: &str,
        outgoing: &OutgoingFile,
    ) -> Result<()> {
        let file = tokio::fs::File::open(&outgoing.path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .upload_client
            .post(peer.upload_url(session_id, file_id, token))
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("upload: {e}")))?;

        if response.status().as_u16() != 200 {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "upload rejected with {status}: {detail}"
            )));
        }
        Ok(())
    }

    /// Best-effort session teardown; the outcome is only logged.
    pub async fn cancel(&self, peer: &PeerEndpoint, session_id: &str) {
        match self.client.post(peer.cancel_url(session_id)).send().await {
            Ok(_) => info!(session = %session_id, "cancel delivered"),
            Err(err) => warn!(session = %session_id, error = %err, "cancel not delivered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn collect_file_stats_and_hashes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello").unwrap();
        tmp.flush().unwrap();

        let outgoing = collect_file(tmp.path(), Some("text/plain")).await.unwrap();
        assert_eq!(outgoing.info.size, 5);
        assert_eq!(outgoing.info.file_type, "text/plain");
        assert_eq!(
            outgoing.info.sha256.as_deref(),
            Some(hex::encode(Sha256::digest(b"hello")).as_str())
        );
        assert!(!outgoing.info.id.is_empty());
        assert!(outgoing.info.metadata.as_ref().unwrap().modified.is_some());
    }

    #[tokio::test]
    async fn collect_file_missing_path_is_not_found() {
        let err = collect_file(Path::new("/definitely/not/here"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn collect_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_file(dir.path(), None).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest));
    }
}
