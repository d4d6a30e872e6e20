use crate::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bridge settings.
///
/// The process lock is always `flydrop-<pid>`: one bridge per process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Give up waiting in [Bridge::initialize] after this many
    /// milliseconds. Unbounded when absent. A ready callback that
    /// arrives later still moves the bridge to [State::Ready].
    pub ready_timeout_ms: Option<u64>,

    #[serde(skip)]
    lock_name: Option<String>,
}

impl BridgeConfig {
    /// Parse from json, missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(codec::decode(json.as_bytes())?)
    }

    /// Bound the wait for the native ready callback.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// See [BridgeConfig::ready_timeout_ms].
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    /// Isolated lock names let tests run bridges side by side.
    #[cfg(test)]
    pub(crate) fn with_lock_name<N: Into<String>>(mut self, name: N) -> Self {
        self.lock_name = Some(name.into());
        self
    }

    pub(crate) fn lock_name(&self) -> String {
        self.lock_name
            .clone()
            .unwrap_or_else(ProcessLock::default_name)
    }
}
