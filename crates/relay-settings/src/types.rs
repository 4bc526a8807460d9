//! Settings type definitions.
//!
//! All types use serde camelCase with `default` so a partial user file
//! deserializes cleanly after the deep merge.

use serde::{Deserialize, Serialize};

/// Top-level Relay settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Token service settings.
    pub auth: AuthSettings,
    /// Job queue settings.
    pub queue: QueueSettings,
    /// Event streamer settings.
    pub stream: StreamSettings,
    /// Session store settings.
    pub store: StoreSettings,
    /// Session defaults.
    pub session: SessionSettings,
}

/// Token service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: u64,
    /// HS256 secret for access tokens. Usually supplied via
    /// `RELAY_ACCESS_SECRET` rather than the settings file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_secret: Option<String>,
    /// HS256 secret for refresh tokens. Usually supplied via
    /// `RELAY_REFRESH_SECRET` rather than the settings file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_secret: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl_secs: 900,
            refresh_ttl_secs: 30 * 24 * 60 * 60,
            access_secret: None,
            refresh_secret: None,
        }
    }
}

/// Job queue settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    /// Number of worker tasks executing jobs.
    pub workers: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Event streamer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Maximum events retained per job for replay.
    pub replay_max_events: usize,
    /// Maximum age of a retained event in milliseconds.
    pub replay_max_age_ms: u64,
    /// Per-subscriber channel capacity beyond the replay window.
    pub subscriber_buffer: usize,
    /// Total drops before a slow subscriber is disconnected.
    pub max_subscriber_drops: u64,
    /// Grace period after the terminal event before subscriptions close,
    /// in milliseconds.
    pub terminal_grace_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            replay_max_events: 256,
            replay_max_age_ms: 60_000,
            subscriber_buffer: 64,
            max_subscriber_drops: 100,
            terminal_grace_ms: 2_000,
        }
    }
}

/// Session store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path to the SQLite database (relative paths resolve against the
    /// process working directory).
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "relay.db".into(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Session defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Provider used when a session is created without one.
    pub default_provider: String,
    /// Model override passed to the runner when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_provider: "claude-code".into(),
            default_model: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
