//! Webhook notifications for transfer lifecycle events.
//!
//! When a webhook URL is configured, `upload_start` and `upload_end`
//! events are posted as JSON, fire-and-forget. Delivery failures are
//! logged and never affect the transfer.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use lanbeam_core::{Error, Result};
use lanbeam_proto::Notification;
use lanbeam_session::{TransferEvent, TransferHooks};

pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Internal(format!("webhook client: {e}")))?;
        Ok(Self { url, client })
    }

    fn dispatch(&self, kind: &str, title: &str, event: &TransferEvent) {
        let Some(url) = self.url.clone() else {
            return;
        };
        let notification = Notification {
            kind: Some(kind.to_string()),
            title: Some(title.to_string()),
            message: Some(format!(
                "sessionId={}, fileId={}",
                event.session_id, event.file_id
            )),
            data: Some(json!({
                "sessionId": event.session_id,
                "fileId": event.file_id,
                "fileName": event.file.file_name,
                "size": event.file.size,
                "fileType": event.file.file_type,
                "sha256": event.file.sha256,
            })),
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&notification).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(%url, "webhook delivered")
                }
                Ok(response) => {
                    warn!(%url, status = %response.status(), "webhook rejected")
                }
                Err(err) => warn!(%url, error = %err, "webhook delivery failed"),
            }
        });
    }
}

#[async_trait]
impl TransferHooks for WebhookNotifier {
    async fn on_upload_started(&self, event: &TransferEvent) {
        self.dispatch("upload_start", "Upload Started", event);
    }

    async fn on_upload_finished(&self, event: &TransferEvent) {
        self.dispatch("upload_end", "Upload Completed", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanbeam_proto::FileInfo;

    fn event() -> TransferEvent {
        TransferEvent {
            session_id: "s1".to_string(),
            file_id: "f1".to_string(),
            file: FileInfo {
                id: "f1".to_string(),
                file_name: "a.txt".to_string(),
                size: 5,
                file_type: "text/plain".to_string(),
                sha256: None,
                preview: None,
                metadata: None,
            },
        }
    }

    #[tokio::test]
    async fn unconfigured_notifier_is_silent() {
        let notifier = WebhookNotifier::new(None).unwrap();
        // Must not spawn or panic without a URL.
        notifier.on_upload_started(&event()).await;
        notifier.on_upload_finished(&event()).await;
    }
}
