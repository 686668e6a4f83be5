//! Saved session — keeps the `coreSID` token between CLI invocations.
//!
//! The file is stored at `~/.config/reseller/session.json`:
//!
//! ```json
//! { "baseUrl": "https://core.resellerinterface.de/", "coreSID": "8f2c..." }
//! ```
//!
//! A token is only restored for the base URL it was issued by.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use reseller_api::ApiClient;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SavedSession {
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(rename = "coreSID")]
    pub sid: Option<String>,
}

impl SavedSession {
    /// Load the saved session; an absent file yields an empty session.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("corrupt session file {}", path.display()))
    }

    /// Capture the client's current token.
    pub fn from_client(client: &ApiClient) -> Self {
        Self {
            base_url: Some(client.base_url().to_owned()),
            sid: client.session(),
        }
    }

    /// Token for `base_url`, if this session was issued there.
    pub fn token_for(&self, base_url: &str) -> Option<&str> {
        if self.base_url.as_deref() == Some(base_url) {
            self.sid.as_deref().filter(|s| !s.is_empty())
        } else {
            None
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn clear() -> Result<()> {
        let path = Self::path()?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn path() -> Result<PathBuf> {
        let config = dirs::config_dir().context("cannot determine config directory")?;
        Ok(config.join("reseller").join("session.json"))
    }
}
