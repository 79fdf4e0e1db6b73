//! Client settings file.
//!
//! Holds the user's transfer preferences, never credentials. Connection
//! descriptors come from the external credential store and get these
//! settings overlaid with [`ClientSettings::apply_to`].

use ftpbrowse_ftp::ConnectionDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub passive_mode: bool,
    pub extended_data_commands: bool,
    pub connect_timeout_sec: u64,
    pub reply_timeout_sec: u64,
    pub data_timeout_sec: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            passive_mode: true,
            extended_data_commands: false,
            connect_timeout_sec: 15,
            reply_timeout_sec: 30,
            data_timeout_sec: 30,
        }
    }
}

impl ClientSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.connect_timeout_sec == 0 || self.reply_timeout_sec == 0 || self.data_timeout_sec == 0
        {
            return Err(SettingsError::Invalid(
                "timeouts must be at least one second".into(),
            ));
        }
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            SettingsError::Invalid(format!("log filter '{}': {}", self.log_filter, e))
        })?;
        Ok(())
    }

    /// Install the global subscriber with `log_filter` as the default.
    pub fn init_logging(&self) -> bool {
        crate::logging::init_logging(&self.log_filter)
    }

    /// Overlay transfer preferences onto a stored connection.
    pub fn apply_to(&self, descriptor: &mut ConnectionDescriptor) {
        descriptor.passive_mode = self.passive_mode;
        descriptor.extended_data_commands = self.extended_data_commands;
        descriptor.connect_timeout_sec = self.connect_timeout_sec;
        descriptor.reply_timeout_sec = self.reply_timeout_sec;
        descriptor.data_timeout_sec = self.data_timeout_sec;
    }
}

/// Reads and writes [`ClientSettings`] as JSON.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing file yields the defaults.
    pub async fn load(&self) -> Result<ClientSettings, SettingsError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let settings: ClientSettings = serde_json::from_str(&contents)?;
                settings.validate()?;
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {:?}, using defaults", self.path);
                Ok(ClientSettings::default())
            }
            Err(e) => Err(SettingsError::Io(e)),
        }
    }

    /// Write to a temp file, then rename over the old one.
    pub async fn save(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(settings)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
