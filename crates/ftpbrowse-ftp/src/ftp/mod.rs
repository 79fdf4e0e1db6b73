//! # ftpbrowse-ftp — session-managed FTP client core
//!
//! RFC 959 control/data protocol with RFC 2428 (EPSV/EPRT) and RFC 3659
//! (MLSD listing lines) support.
//!
//! Architecture:
//! - `types` — descriptor, replies, entries, session snapshots
//! - `error` — FTP-specific error type
//! - `protocol` — low-level command/reply codec
//! - `connection` — TCP transport for the control connection
//! - `client` — control channel state machine (greeting, login, QUIT)
//! - `parser` — Unix/MS-DOS/MLSD LIST payload parsing
//! - `transfer` — data channel negotiation (PASV/EPSV/PORT/EPRT) and streaming
//! - `session` — one control channel plus its directory context
//! - `directory` — list, mkdir, rmdir, rename
//! - `file_ops` — upload, download, delete
//! - `queue` — per-session worker that runs operations in FIFO order
//! - `service` — registry of open sessions keyed by id

pub mod types;
pub mod error;
pub mod protocol;
pub mod connection;
pub mod client;
pub mod parser;
pub mod transfer;
pub mod session;
pub mod directory;
pub mod file_ops;
pub mod queue;
pub mod service;

pub use types::*;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use client::ControlChannel;
pub use session::{DirectoryContext, Session};
pub use queue::{ByteSink, ByteSource, Operation, OperationOutput, SessionHandle};
pub use service::{FtpService, FtpServiceState};
