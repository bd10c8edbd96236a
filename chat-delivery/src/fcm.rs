use chat_core::config::DeliveryConfig;
use serde_json::Value;

use crate::transport::{PushNote, PushTransport, TransportError};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// FCM transport for Android tokens, talking to the legacy HTTP API with a
/// server key. Disabled (sends become no-ops) when no key is configured.
pub struct FcmTransport {
    client: Option<reqwest::Client>,
    server_key: Option<String>,
}

impl FcmTransport {
    pub fn new(config: &DeliveryConfig) -> Self {
        let (client, server_key) = if let Some(key) = &config.fcm_server_key {
            tracing::info!("Initializing FCM client");
            (Some(reqwest::Client::new()), Some(key.clone()))
        } else {
            tracing::warn!("FCM delivery disabled (missing configuration)");
            (None, None)
        };

        Self { client, server_key }
    }
}

#[async_trait::async_trait]
impl PushTransport for FcmTransport {
    async fn send(&self, device_token: &str, note: &PushNote) -> Result<(), TransportError> {
        let (client, server_key) = match (&self.client, &self.server_key) {
            (Some(client), Some(key)) => (client, key),
            _ => {
                tracing::debug!("FCM not configured, skipping");
                return Ok(());
            }
        };

        let payload = serde_json::json!({
            "to": device_token,
            "notification": {
                "title": note.title,
                "body": note.body,
            },
            "data": {
                "channel_id": note.channel_id,
            },
        });

        let response = client
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={}", server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Transient(format!("FCM request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Transient(format!(
                "FCM returned status {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Transient(format!("FCM response unreadable: {}", e)))?;

        // A 200 can still carry a per-token failure in `results`.
        let error = body
            .get("results")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .and_then(|r| r.get("error"))
            .and_then(|e| e.as_str());

        match error {
            None => {
                tracing::debug!(token = %device_token, "FCM notification sent");
                Ok(())
            }
            Some("NotRegistered") | Some("InvalidRegistration") | Some("MissingRegistration") => {
                Err(TransportError::Unregistered)
            }
            Some(other) => Err(TransportError::Transient(format!(
                "FCM rejected notification: {}",
                other
            ))),
        }
    }
}
