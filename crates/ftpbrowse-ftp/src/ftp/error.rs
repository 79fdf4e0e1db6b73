//! FTP-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised FTP error.
///
/// Every failed operation yields exactly one of these; the caller decides
/// between a generic notice (`kind`) and a detailed one (`message`, `code`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
    /// Bytes moved before a transfer failed.
    pub bytes_transferred: Option<u64>,
    /// The control channel was invalidated and must be replaced.
    pub session_lost: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// TCP / DNS failure or unusable greeting.
    Connect,
    /// Credentials rejected.
    Auth,
    /// LIST failed, on either connection.
    List,
    /// Upload or download failed.
    Transfer,
    /// MKD rejected.
    Mkdir,
    /// A bounded wait on a socket expired.
    Timeout,
    /// Server sent something that is not an FTP reply.
    Protocol,
    /// Control channel closed or the session is gone.
    Disconnected,
    /// DELE / RMD / RNFR / RNTO rejected.
    CommandRejected,
    /// Queued operation dropped because its session closed.
    Cancelled,
    InvalidConfig,
    /// Local I/O failure.
    Io,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
            bytes_transferred: None,
            session_lost: false,
            session_id: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes_transferred = Some(bytes);
        self
    }

    pub fn lost(mut self) -> Self {
        self.session_lost = true;
        self
    }

    /// Re-label the error for the operation that observed it.
    ///
    /// Only data-side `Io` / `Protocol` failures are re-labelled; connect,
    /// auth, timeout and control-channel failures keep their own kind.
    pub fn during(mut self, kind: FtpErrorKind) -> Self {
        if !self.session_lost && matches!(self.kind, FtpErrorKind::Io | FtpErrorKind::Protocol) {
            self.kind = kind;
        }
        self
    }

    /// Whether some, but not necessarily all, bytes were moved.
    pub fn is_partial(&self) -> bool {
        self.bytes_transferred.map(|b| b > 0).unwrap_or(false)
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn connect_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Connect, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Auth, msg)
    }

    pub fn list_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::List, msg)
    }

    pub fn transfer_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Transfer, msg)
    }

    pub fn mkdir_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Mkdir, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, msg)
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Protocol, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Cancelled, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Io, msg)
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new(
            FtpErrorKind::Disconnected,
            format!("FTP session '{}' not found", id),
        )
        .with_session(id)
    }

    /// Build the error for a negative or unexpected reply to `kind`'s command.
    pub fn from_reply(kind: FtpErrorKind, code: u16, text: &str) -> Self {
        Self::new(kind, text).with_code(code)
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[FTP {:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else {
            Self::io_error(e.to_string())
        }
    }
}

impl From<FtpError> for String {
    fn from(e: FtpError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let e = FtpError::from_reply(FtpErrorKind::Transfer, 551, "551 Page type unknown");
        assert_eq!(e.to_string(), "[FTP Transfer 551] 551 Page type unknown");
    }

    #[test]
    fn during_relabels_data_errors_only() {
        let data = FtpError::io_error("reset").during(FtpErrorKind::List);
        assert_eq!(data.kind, FtpErrorKind::List);

        let control = FtpError::disconnected("eof").lost().during(FtpErrorKind::List);
        assert_eq!(control.kind, FtpErrorKind::Disconnected);
        assert!(control.session_lost);

        let slow = FtpError::timeout("data stalled").during(FtpErrorKind::Transfer);
        assert_eq!(slow.kind, FtpErrorKind::Timeout);

        let auth = FtpError::auth_failed("530").during(FtpErrorKind::List);
        assert_eq!(auth.kind, FtpErrorKind::Auth);
    }

    #[test]
    fn partial_needs_bytes() {
        assert!(!FtpError::transfer_failed("x").is_partial());
        assert!(!FtpError::transfer_failed("x").with_bytes(0).is_partial());
        assert!(FtpError::transfer_failed("x").with_bytes(10).is_partial());
    }

    #[test]
    fn io_timeout_maps_to_timeout() {
        let e: FtpError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(e.kind, FtpErrorKind::Timeout);
    }
}
