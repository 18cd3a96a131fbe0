//! Client configuration.
//!
//! Everything here must be settled before the client is started. Durations
//! are written as milliseconds when (de)serialized, so a config file looks
//! like:
//!
//! ```json
//! { "connect_timeout_ms": 60000, "read_timeout_ms": 30000, "handshake": true }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelinkError, Result};

/// Default per-attempt connect timeout (60 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on an outbound message, excluding the terminator
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 127;

/// Default bound on an inbound frame, including prefix and terminator
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Configuration for a single client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline applied to each connect attempt
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Deadline applied to each inbound read; `None` waits indefinitely
    #[serde(rename = "read_timeout_ms", with = "opt_duration_ms")]
    pub read_timeout: Option<Duration>,
    /// Deadline applied to each outbound write; `None` waits indefinitely
    #[serde(rename = "write_timeout_ms", with = "opt_duration_ms")]
    pub write_timeout: Option<Duration>,
    /// Pause before each outbound message
    #[serde(rename = "heartbeat_interval_ms", with = "opt_duration_ms")]
    pub heartbeat_interval: Option<Duration>,
    /// Send the one-time newline probe right after connecting
    pub handshake: bool,
    /// Outbound messages are truncated to this many bytes
    pub max_message_len: usize,
    /// Inbound frames longer than this are a transport error
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            write_timeout: None,
            heartbeat_interval: None,
            handshake: true,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn with_handshake(mut self, enabled: bool) -> Self {
        self.handshake = enabled;
        self
    }

    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Loads and validates a JSON config file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelinkError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every bound is usable.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a timeout is zero or a length bound is zero.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(RelinkError::Config("connect timeout must be non-zero".into()));
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RelinkError::Config("read timeout must be non-zero".into()));
        }
        if self.write_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RelinkError::Config("write timeout must be non-zero".into()));
        }
        if self.heartbeat_interval.is_some_and(|t| t.is_zero()) {
            return Err(RelinkError::Config("heartbeat interval must be non-zero".into()));
        }
        if self.max_message_len == 0 {
            return Err(RelinkError::Config("max message length must be non-zero".into()));
        }
        // prefix + terminator is the smallest meaningful frame
        if self.max_frame_len < 2 {
            return Err(RelinkError::Config(format!(
                "max frame length must be at least 2, got {}",
                self.max_frame_len
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
