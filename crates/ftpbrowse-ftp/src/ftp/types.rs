//! Shared types for the FTP crate.

use crate::ftp::error::{FtpError, FtpResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─── Connection descriptor ───────────────────────────────────────────

/// Data-connection negotiation selected for a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DataChannelMode {
    Passive,
    ExtendedPassive,
    Active,
    ExtendedActive,
}

/// Immutable description of one FTP server login.
///
/// Supplied by an external credential store; the core never mutates or
/// persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub passive_mode: bool,
    /// Use EPSV/EPRT instead of PASV/PORT.
    #[serde(default)]
    pub extended_data_commands: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_sec: u64,
    /// Upper bound on waiting for a single control-channel reply line.
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_sec: u64,
    /// Upper bound on a single data-connection read, write or accept.
    #[serde(default = "default_data_timeout")]
    pub data_timeout_sec: u64,
    /// Local address to bind for active-mode data connections.
    #[serde(default)]
    pub active_bind_address: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_port() -> u16 {
    21
}
fn default_username() -> String {
    "anonymous".into()
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_reply_timeout() -> u64 {
    30
}
fn default_data_timeout() -> u64 {
    30
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: default_username(),
            password: "anonymous@".into(),
            passive_mode: true,
            extended_data_commands: false,
            connect_timeout_sec: default_connect_timeout(),
            reply_timeout_sec: default_reply_timeout(),
            data_timeout_sec: default_data_timeout(),
            active_bind_address: None,
            label: None,
        }
    }
}

impl ConnectionDescriptor {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> FtpResult<()> {
        if self.host.trim().is_empty() {
            return Err(FtpError::invalid_config("Host must not be empty"));
        }
        if self.port == 0 {
            return Err(FtpError::invalid_config("Port must not be 0"));
        }
        if self.connect_timeout_sec == 0 || self.reply_timeout_sec == 0 || self.data_timeout_sec == 0
        {
            return Err(FtpError::invalid_config("Timeouts must be at least one second"));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn data_channel_mode(&self) -> DataChannelMode {
        match (self.passive_mode, self.extended_data_commands) {
            (true, false) => DataChannelMode::Passive,
            (true, true) => DataChannelMode::ExtendedPassive,
            (false, false) => DataChannelMode::Active,
            (false, true) => DataChannelMode::ExtendedActive,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_sec)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_sec)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_sec)
    }
}

// ─── Control channel ─────────────────────────────────────────────────

/// Lifecycle of a control channel.
///
/// `Disconnected -> Connecting -> Connected -> Authenticated -> Disconnected`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
}

/// A single FTP reply (may be multi-line).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    /// Full reply text, raw lines joined.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Reply text with the `nnn-` / `nnn ` prefixes removed.
    pub fn message(&self) -> String {
        let bare = self.code.to_string();
        let prefix_dash = format!("{}-", self.code);
        let prefix_space = format!("{} ", self.code);
        self.lines
            .iter()
            .map(|l| {
                if *l == bare {
                    ""
                } else {
                    l.strip_prefix(&prefix_dash)
                        .or_else(|| l.strip_prefix(&prefix_space))
                        .unwrap_or(l.as_str())
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 1xx
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2xx
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// 4xx or 5xx.
    pub fn is_negative(&self) -> bool {
        self.code >= 400
    }
}

// ─── Directory listing ───────────────────────────────────────────────

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Raw permission string as printed by the server (`-rw-r--r--`, `0644`).
    pub permissions: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub link_target: Option<String>,
    /// The listing line this entry was parsed from.
    pub raw: String,
}

impl RemoteEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

// ─── Transfer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Book-keeping for one upload or download while it is running.
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub remote_path: String,
    pub direction: TransferDirection,
    pub bytes_transferred: u64,
    pub started_at: DateTime<Utc>,
}

impl TransferTask {
    pub fn new(remote_path: &str, direction: TransferDirection) -> Self {
        Self {
            remote_path: remote_path.to_string(),
            direction,
            bytes_transferred: 0,
            started_at: Utc::now(),
        }
    }

    /// Average throughput in bytes per second.
    pub fn speed_bps(&self) -> u64 {
        let elapsed = (Utc::now() - self.started_at).num_milliseconds().max(1) as u64;
        self.bytes_transferred * 1000 / elapsed
    }
}

// ─── Session snapshot ────────────────────────────────────────────────

/// Point-in-time view of a session, safe to hand to the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSessionInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub label: Option<String>,
    pub current_directory: String,
    pub closed: bool,
    pub opened_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_strips_reply_prefixes() {
        let resp = FtpResponse {
            code: 150,
            lines: vec![
                "150-Opening data".into(),
                "150-still going".into(),
                "150 done".into(),
            ],
        };
        assert_eq!(resp.message(), "Opening data\nstill going\ndone");
        assert_eq!(resp.text(), "150-Opening data\n150-still going\n150 done");
        assert!(resp.is_preliminary());
    }

    #[test]
    fn descriptor_defaults_from_json() {
        let d: ConnectionDescriptor =
            serde_json::from_str(r#"{"host":"ftp.example.com","username":"user","password":"pass"}"#)
                .unwrap();
        assert_eq!(d.port, 21);
        assert!(d.passive_mode);
        assert_eq!(d.data_channel_mode(), DataChannelMode::Passive);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn descriptor_rejects_empty_host() {
        let d = ConnectionDescriptor::default();
        assert!(d.validate().is_err());
    }

    #[test]
    fn data_mode_follows_flags() {
        let mut d = ConnectionDescriptor::new("h", 21, "u", "p");
        d.passive_mode = false;
        d.extended_data_commands = true;
        assert_eq!(d.data_channel_mode(), DataChannelMode::ExtendedActive);
    }
}
