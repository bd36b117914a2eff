//! Tunables for credential contexts.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options applied to every context a [`CredentialContext`](crate::CredentialContext) activates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Kill auth provider commands that run longer than this many seconds.
    /// Unset means wait indefinitely.
    pub exec_timeout_secs: Option<u64>,

    /// Directory for materialized credential files. Defaults to the system
    /// temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl ContextOptions {
    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}
