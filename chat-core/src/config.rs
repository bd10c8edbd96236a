use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base interval between store polls for an open session.
    pub poll_interval_ms: u64,
    /// Ceiling for the doubling backoff applied on consecutive poll failures.
    pub poll_backoff_max_ms: u64,
    pub send_max_attempts: u32,
    pub send_backoff_initial_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Admin operator ids; a user-sent message fans out to all of them.
    pub admin_ids: Vec<String>,
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub apns_bundle_id: Option<String>,
    pub apns_key_id: Option<String>,
    pub apns_team_id: Option<String>,
    pub apns_key_path: Option<String>,
    pub apns_key_content: Option<String>, // Base64 encoded key content (alternative to path)
    pub fcm_server_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();

        Config {
            session: SessionConfig {
                poll_interval_ms: env::var("CHAT_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
                poll_backoff_max_ms: env::var("CHAT_POLL_BACKOFF_MAX_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .unwrap_or(30000),
                send_max_attempts: env::var("CHAT_SEND_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                send_backoff_initial_ms: env::var("CHAT_SEND_BACKOFF_INITIAL_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500),
            },
            delivery: DeliveryConfig {
                admin_ids: env::var("CHAT_ADMIN_IDS")
                    .map(|s| {
                        s.split(',')
                            .map(|id| id.trim().to_string())
                            .filter(|id| !id.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                max_attempts: env::var("CHAT_DELIVERY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                backoff_initial_ms: env::var("CHAT_DELIVERY_BACKOFF_INITIAL_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500),
                backoff_max_ms: env::var("CHAT_DELIVERY_BACKOFF_MAX_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .unwrap_or(30000),
                apns_bundle_id: env::var("APNS_BUNDLE_ID").ok(),
                apns_key_id: env::var("APNS_KEY_ID").ok(),
                apns_team_id: env::var("APNS_TEAM_ID").ok(),
                apns_key_path: env::var("APNS_KEY_PATH").ok(),
                apns_key_content: env::var("APNS_KEY_CONTENT").ok(),
                fcm_server_key: env::var("FCM_SERVER_KEY").ok(),
            },
        }
    }
}
