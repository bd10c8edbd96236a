use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chat_core::types::ActorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "web" => Ok(Platform::Web),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRegistration {
    pub actor_id: ActorId,
    pub platform: Platform,
    pub token: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen_valid_at: Option<DateTime<Utc>>,
    pub valid: bool,
}

/// Device push tokens keyed by `(actor_id, platform)`. At most one active
/// token per key: a re-registration with a new token supersedes the old
/// row, a delivery-reported dead token is marked invalid (not deleted) so
/// dispatch skips it without a liveness probe.
pub struct PushTokenRegistry {
    inner: Mutex<HashMap<(ActorId, Platform), PushRegistration>>,
}

fn lock(
    m: &Mutex<HashMap<(ActorId, Platform), PushRegistration>>,
) -> MutexGuard<'_, HashMap<(ActorId, Platform), PushRegistration>> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PushTokenRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Upsert a registration. Registering the same still-valid token again
    /// only refreshes `registered_at`; anything else (new token, or a
    /// previously invalidated row) is replaced by a fresh valid row.
    pub fn register(&self, actor_id: &str, platform: Platform, token: &str) {
        let key = (actor_id.to_string(), platform);
        let mut map = lock(&self.inner);
        match map.get_mut(&key) {
            Some(existing) if existing.valid && existing.token == token => {
                existing.registered_at = Utc::now();
                tracing::debug!(actor = %actor_id, %platform, "push token refreshed");
            }
            _ => {
                map.insert(
                    key,
                    PushRegistration {
                        actor_id: actor_id.to_string(),
                        platform,
                        token: token.to_string(),
                        registered_at: Utc::now(),
                        last_seen_valid_at: None,
                        valid: true,
                    },
                );
                tracing::info!(actor = %actor_id, %platform, "push token registered");
            }
        }
    }

    /// Mark the registration dead after a permanent delivery failure. The
    /// row is kept so a later re-registration supersedes it.
    pub fn invalidate(&self, actor_id: &str, platform: Platform) {
        let mut map = lock(&self.inner);
        if let Some(entry) = map.get_mut(&(actor_id.to_string(), platform)) {
            if entry.valid {
                entry.valid = false;
                tracing::info!(actor = %actor_id, %platform, "push token invalidated");
            }
        }
    }

    /// Currently-valid tokens for an actor, across platforms.
    pub fn tokens_for(&self, actor_id: &str) -> Vec<(Platform, String)> {
        lock(&self.inner)
            .values()
            .filter(|r| r.actor_id == actor_id && r.valid)
            .map(|r| (r.platform, r.token.clone()))
            .collect()
    }

    /// Record a successful delivery through this token.
    pub fn mark_delivered(&self, actor_id: &str, platform: Platform) {
        let mut map = lock(&self.inner);
        if let Some(entry) = map.get_mut(&(actor_id.to_string(), platform)) {
            entry.last_seen_valid_at = Some(Utc::now());
        }
    }

    pub fn registration(&self, actor_id: &str, platform: Platform) -> Option<PushRegistration> {
        lock(&self.inner)
            .get(&(actor_id.to_string(), platform))
            .cloned()
    }
}

impl Default for PushTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}
