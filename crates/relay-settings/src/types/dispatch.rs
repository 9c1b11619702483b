//! Call dispatch settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the call dispatcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Deadline for a worker to answer an invocation. `0` disables the
    /// deadline and waits until the worker replies or disconnects.
    pub invoke_timeout_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            invoke_timeout_ms: 30_000,
        }
    }
}

impl DispatchSettings {
    /// The invocation deadline, or `None` when disabled.
    pub fn invoke_timeout(&self) -> Option<Duration> {
        (self.invoke_timeout_ms > 0).then_some(Duration::from_millis(self.invoke_timeout_ms))
    }
}
