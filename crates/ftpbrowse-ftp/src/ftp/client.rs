//! Control channel — owns the command/reply connection to one server.
//!
//! Lifecycle: `connect()` reads the greeting, `authenticate()` runs
//! USER/PASS, `send_command()` performs one exchange at a time and
//! `disconnect()` sends a best-effort QUIT.
//!
//! Any I/O error, timeout, malformed reply or `421` invalidates the channel:
//! the socket is dropped, the state becomes `Disconnected` and the error is
//! flagged `session_lost`. A dead channel is never reused.

use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::*;
use std::net::SocketAddr;

pub struct ControlChannel {
    codec: Option<FtpCodec>,
    state: ChannelState,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    banner: Option<String>,
    last_code: Option<u16>,
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self {
            codec: None,
            state: ChannelState::Disconnected,
            local_addr: None,
            peer_addr: None,
            banner: None,
            last_code: None,
        }
    }
}

impl ControlChannel {
    /// Connect to the server and consume its greeting.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> FtpResult<Self> {
        descriptor.validate()?;
        let transport = connection::connect(descriptor).await?;
        let mut channel = Self::from_codec(transport.codec);
        channel.local_addr = transport.local_addr;
        channel.peer_addr = transport.peer_addr;
        channel.read_greeting().await?;
        log::info!(
            "FTP connected to {} ({})",
            descriptor.address(),
            channel.banner.as_deref().unwrap_or_default()
        );
        Ok(channel)
    }

    /// Wrap an already-open transport whose greeting has not been read.
    pub fn from_codec(codec: FtpCodec) -> Self {
        Self {
            codec: Some(codec),
            state: ChannelState::Connecting,
            ..Self::default()
        }
    }

    /// Read the server greeting, skipping `120` "ready in n minutes" replies.
    pub async fn read_greeting(&mut self) -> FtpResult<FtpResponse> {
        loop {
            let resp = self.read_reply().await.map_err(|e| match e.kind {
                FtpErrorKind::Timeout => e,
                _ => FtpError {
                    kind: FtpErrorKind::Connect,
                    ..e
                },
            })?;
            if resp.is_preliminary() {
                continue;
            }
            if resp.code != 220 {
                self.invalidate();
                return Err(FtpError::from_reply(
                    FtpErrorKind::Connect,
                    resp.code,
                    &format!("Unexpected greeting: {}", resp.text()),
                )
                .lost());
            }
            self.banner = Some(resp.message());
            self.state = ChannelState::Connected;
            return Ok(resp);
        }
    }

    // ─── Authentication ──────────────────────────────────────────

    /// Log in with USER / PASS.
    ///
    /// A rejected login leaves the channel `Connected`; the caller decides
    /// whether to retry or disconnect.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> FtpResult<()> {
        match self.state {
            ChannelState::Authenticated => return Ok(()),
            ChannelState::Connected => {}
            _ => {
                return Err(FtpError::disconnected("Control channel is not connected").lost())
            }
        }

        let user = self.send_command("USER", Some(username)).await?;
        let resp = match user.code {
            230 => user,
            331 => self.send_command("PASS", Some(password)).await?,
            _ => {
                return Err(FtpError::from_reply(
                    FtpErrorKind::Auth,
                    user.code,
                    &format!("USER rejected: {}", user.text()),
                ))
            }
        };

        match resp.code {
            230 | 202 => {
                self.state = ChannelState::Authenticated;
                log::debug!("FTP login as '{}' accepted", username);
                Ok(())
            }
            332 => Err(FtpError::from_reply(
                FtpErrorKind::Auth,
                332,
                "Server requires an account (ACCT) which is not supported",
            )),
            code => Err(FtpError::from_reply(
                FtpErrorKind::Auth,
                code,
                &format!("Login failed: {}", resp.text()),
            )),
        }
    }

    // ─── Command exchange ────────────────────────────────────────

    /// Write one command line and block until its full reply is read.
    pub async fn send_command(&mut self, verb: &str, args: Option<&str>) -> FtpResult<FtpResponse> {
        let codec = match (self.state, self.codec.as_mut()) {
            (ChannelState::Connected | ChannelState::Authenticated, Some(codec)) => codec,
            _ => return Err(FtpError::disconnected("Control channel is not connected").lost()),
        };
        let line = match args {
            Some(a) if !a.is_empty() => format!("{} {}", verb, a),
            _ => verb.to_string(),
        };
        let result = codec.execute(&line).await;
        self.settle(result)
    }

    /// Read one more reply without sending anything (transfer completion).
    pub async fn read_reply(&mut self) -> FtpResult<FtpResponse> {
        let codec = match self.codec.as_mut() {
            Some(codec) => codec,
            None => return Err(FtpError::disconnected("Control channel is not connected").lost()),
        };
        let result = codec.read_response().await;
        self.settle(result)
    }

    fn settle(&mut self, result: FtpResult<FtpResponse>) -> FtpResult<FtpResponse> {
        match result {
            Ok(resp) if resp.code == 421 => {
                log::warn!("FTP server is closing the control connection: {}", resp.text());
                self.invalidate();
                Err(FtpError::from_reply(FtpErrorKind::Disconnected, 421, &resp.text()).lost())
            }
            Ok(resp) => {
                self.last_code = Some(resp.code);
                Ok(resp)
            }
            // Refused before anything was written.
            Err(e) if e.kind == FtpErrorKind::InvalidConfig => Err(e),
            Err(e) => {
                log::warn!("FTP control channel failed: {}", e);
                self.invalidate();
                Err(e.lost())
            }
        }
    }

    fn invalidate(&mut self) {
        self.codec = None;
        self.state = ChannelState::Disconnected;
    }

    // ─── Helpers ─────────────────────────────────────────────────

    /// Switch to binary (image) transfer type.
    pub async fn set_binary(&mut self) -> FtpResult<()> {
        let resp = self.send_command("TYPE", Some("I")).await?;
        if !resp.is_completion() {
            return Err(FtpError::from_reply(
                FtpErrorKind::Protocol,
                resp.code,
                &format!("TYPE I rejected: {}", resp.text()),
            ));
        }
        Ok(())
    }

    pub async fn noop(&mut self) -> FtpResult<()> {
        let resp = self.send_command("NOOP", None).await?;
        if !resp.is_completion() {
            return Err(FtpError::from_reply(
                FtpErrorKind::Protocol,
                resp.code,
                &resp.text(),
            ));
        }
        Ok(())
    }

    /// Query the server-side working directory.
    pub async fn pwd(&mut self) -> FtpResult<String> {
        let resp = self.send_command("PWD", None).await?;
        if !resp.is_completion() {
            return Err(FtpError::from_reply(
                FtpErrorKind::Protocol,
                resp.code,
                &resp.text(),
            ));
        }
        parse_quoted_path(&resp.text())
            .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PWD: {}", resp.text())))
    }

    // ─── QUIT ────────────────────────────────────────────────────

    /// Best-effort QUIT, then close. Never fails.
    pub async fn disconnect(&mut self) {
        if let Some(mut codec) = self.codec.take() {
            if matches!(
                self.state,
                ChannelState::Connected | ChannelState::Authenticated
            ) {
                if let Err(e) = codec.execute("QUIT").await {
                    log::debug!("FTP QUIT failed, closing anyway: {}", e);
                }
            }
            codec.shutdown().await;
        }
        self.state = ChannelState::Disconnected;
    }

    // ─── Accessors ───────────────────────────────────────────────

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ChannelState::Authenticated
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn last_code(&self) -> Option<u16> {
        self.last_code
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

/// Extract the path from a `257 "/some/path" ...` reply.
///
/// Embedded quotes are doubled (`""`) per RFC 959.
pub fn parse_quoted_path(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let mut out = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                out.push('"');
            } else {
                return Some(out);
            }
        } else {
            out.push(c);
        }
    }
    None
}
