//! Controller connection settings
//!
//! Stored as a JSON file:
//!
//! ```json
//! {"url": "https://apic1", "username": "admin", "password": "secret", "verify_ssl": false}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Connection settings for one controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApicConfig {
    /// Base URL, e.g. `https://apic1.example.com`.
    pub url: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Verify the controller's TLS certificate.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_verify_ssl() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

impl ApicConfig {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            verify_ssl: default_verify_ssl(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read controller config from {:?}", path))?;
        let config: ApicConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse controller config {:?}", path))?;
        Ok(config)
    }

    /// Write settings to a JSON file, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move config into place at {:?}", path))?;
        Ok(())
    }
}
