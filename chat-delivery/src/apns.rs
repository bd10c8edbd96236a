use a2::response::ErrorReason;
use a2::{Client, NotificationBuilder, NotificationOptions, PlainNotificationBuilder};
use anyhow::{anyhow, Result};
use chat_core::config::DeliveryConfig;
use std::fs;

use crate::transport::{PushNote, PushTransport, TransportError};

/// APNs transport for iOS tokens. Without key material in the config the
/// transport stays disabled and sends become no-ops.
pub struct ApnsTransport {
    client: Option<Client>,
    bundle_id: String,
}

impl ApnsTransport {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let bundle_id = config.apns_bundle_id.clone().unwrap_or_default();

        let client = if let (Some(key_id), Some(team_id)) =
            (&config.apns_key_id, &config.apns_team_id)
        {
            tracing::info!("Initializing APNs client");

            // Read the key file or use base64 content if provided
            let key_content = if let Some(key_content_base64) = &config.apns_key_content {
                use base64::Engine;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(key_content_base64)
                    .map_err(|e| anyhow!("Failed to decode base64 APNs key: {}", e))?;
                String::from_utf8(decoded)
                    .map_err(|e| anyhow!("Failed to convert APNs key to UTF-8: {}", e))?
            } else if let Some(key_path) = &config.apns_key_path {
                fs::read_to_string(key_path)
                    .map_err(|e| anyhow!("Failed to read APNs key file {}: {}", key_path, e))?
            } else {
                return Err(anyhow!(
                    "Either apns_key_path or apns_key_content must be provided"
                ));
            };

            let client = Client::token(
                key_content.as_bytes(),
                key_id,
                team_id,
                if bundle_id.contains("sandbox") || bundle_id.contains("dev") {
                    a2::Endpoint::Sandbox
                } else {
                    a2::Endpoint::Production
                },
            )
            .map_err(|e| anyhow!("Failed to create APNs client: {}", e))?;

            tracing::info!("APNs client initialized successfully");
            Some(client)
        } else {
            tracing::warn!("APNs delivery disabled (missing configuration)");
            None
        };

        Ok(Self { client, bundle_id })
    }
}

#[async_trait::async_trait]
impl PushTransport for ApnsTransport {
    async fn send(&self, device_token: &str, note: &PushNote) -> Result<(), TransportError> {
        let client = match &self.client {
            Some(c) => c,
            None => {
                tracing::debug!("APNs not configured, skipping");
                return Ok(());
            }
        };

        let mut builder = PlainNotificationBuilder::new(&note.body);
        builder.set_category(&note.channel_id);

        // Topic (bundle ID) is required for token-based auth.
        let mut options = NotificationOptions::default();
        if !self.bundle_id.is_empty() {
            options.apns_topic = Some(&self.bundle_id);
        }

        let payload = builder.build(device_token, options);

        match client.send(payload).await {
            Ok(response) => {
                tracing::debug!(token = %device_token, ?response, "APNs notification sent");
                Ok(())
            }
            Err(a2::Error::ResponseError(response)) => {
                match response.error.as_ref().map(|body| &body.reason) {
                    Some(ErrorReason::Unregistered) | Some(ErrorReason::BadDeviceToken) => {
                        Err(TransportError::Unregistered)
                    }
                    Some(reason) => Err(TransportError::Transient(format!(
                        "APNs rejected notification: {:?}",
                        reason
                    ))),
                    None => Err(TransportError::Transient(format!(
                        "APNs error status {}",
                        response.code
                    ))),
                }
            }
            Err(e) => Err(TransportError::Transient(format!(
                "Failed to send APNs notification: {}",
                e
            ))),
        }
    }
}
