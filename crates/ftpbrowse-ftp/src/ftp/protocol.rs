//! Low-level FTP command/reply codec (RFC 959 §4).
//!
//! Handles:
//! - Sending FTP command lines terminated with `\r\n`
//! - Reading single-line and multi-line replies
//! - Parsing the 3-digit reply code
//! - Bounding every line read with the reply timeout

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::FtpResponse;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Longest reply line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 8192;
/// Most lines accepted in one multi-line reply.
pub const MAX_REPLY_LINES: usize = 1024;

pub type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// The FTP command/reply codec operating on split halves.
pub struct FtpCodec {
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
    reply_timeout: Duration,
}

impl FtpCodec {
    pub fn new(reader: BoxedReader, writer: BoxedWriter, reply_timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            reply_timeout,
        }
    }

    /// Create a codec from a plain TCP stream.
    pub fn from_tcp(stream: TcpStream, reply_timeout: Duration) -> Self {
        let (rd, wr) = stream.into_split();
        Self::new(Box::new(rd), Box::new(wr), reply_timeout)
    }

    /// Send a raw FTP command line (without trailing CRLF, we add it).
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        if cmd.contains('\r') || cmd.contains('\n') {
            return Err(FtpError::invalid_config(
                "Command arguments must not contain line breaks",
            ));
        }
        let line = format!("{}\r\n", cmd);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        log::trace!(">>> {}", redact(cmd));
        Ok(())
    }

    /// Read a single line from the control channel, CRLF stripped.
    ///
    /// Bytes that are not UTF-8 (Latin-1 file names, say) are replaced
    /// rather than rejected.
    async fn read_line(&mut self) -> FtpResult<String> {
        let mut buf = Vec::new();
        let limit = self.reply_timeout;
        let mut bounded = (&mut self.reader).take(MAX_LINE_LEN as u64);
        let n = timeout(limit, bounded.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| FtpError::timeout(format!("No reply within {:?}", limit)))??;
        if n == 0 {
            return Err(FtpError::disconnected("Server closed connection"));
        }
        if n == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
            return Err(FtpError::protocol_error(format!(
                "Reply line longer than {} bytes",
                MAX_LINE_LEN
            )));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(|c| c == '\r' || c == '\n').to_string())
    }

    /// Read a complete FTP reply (possibly multi-line).
    ///
    /// Multi-line replies look like:
    /// ```text
    /// 220-Welcome to my FTP server
    /// 220-This is line 2
    /// 220 End of greeting
    /// ```
    /// Lines inside the block may carry any text; only a line starting with
    /// the same code followed by a space (or the bare code) ends it.
    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let is_multi = first.as_bytes().get(3) == Some(&b'-');
        let mut lines = vec![first];

        if is_multi {
            let bare = code.to_string();
            let terminator = format!("{} ", code);
            loop {
                if lines.len() >= MAX_REPLY_LINES {
                    return Err(FtpError::protocol_error(format!(
                        "Reply {} exceeds {} lines",
                        code, MAX_REPLY_LINES
                    )));
                }
                let next = self.read_line().await?;
                let done = next.starts_with(&terminator) || next == bare;
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!(
            "<<< {} {}",
            resp.code,
            resp.lines.last().map(String::as_str).unwrap_or_default()
        );
        Ok(resp)
    }

    /// Send a command and return the reply.
    pub async fn execute(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }

    /// Best-effort shutdown of the write half.
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> FtpResult<u16> {
    let head = line
        .get(..3)
        .ok_or_else(|| FtpError::protocol_error(format!("Reply too short: '{}'", line)))?;
    let valid_sep = matches!(line.as_bytes().get(3), None | Some(b' ') | Some(b'-'));
    if !head.bytes().all(|b| b.is_ascii_digit()) || !valid_sep {
        return Err(FtpError::protocol_error(format!(
            "Invalid reply code in: '{}'",
            line
        )));
    }
    head.parse::<u16>()
        .map_err(|_| FtpError::protocol_error(format!("Invalid reply code in: '{}'", line)))
}

/// Mask the PASS argument before it reaches a log.
fn redact(cmd: &str) -> &str {
    if cmd.get(..5).map_or(false, |v| v.eq_ignore_ascii_case("PASS ")) {
        "PASS ****"
    } else {
        cmd
    }
}
