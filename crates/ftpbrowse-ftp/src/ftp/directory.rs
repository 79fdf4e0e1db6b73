//! Directory operations — list, mkdir, rmdir, rename.

use crate::ftp::client::parse_quoted_path;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::parser;
use crate::ftp::session::Session;
use crate::ftp::transfer::{collect, MAX_LISTING_LEN};
use crate::ftp::types::*;

impl Session {
    // ─── LIST ────────────────────────────────────────────────────

    /// List `path`, or the server's current directory when `path` is empty.
    ///
    /// An empty directory is `Ok(vec![])`.
    pub async fn list(&mut self, path: &str) -> FtpResult<Vec<RemoteEntry>> {
        self.ensure_connected().await?;
        let limit = self.descriptor.data_timeout();

        let connector = self
            .open_data()
            .await
            .map_err(|e| e.during(FtpErrorKind::List))?;
        let args = if path.is_empty() { None } else { Some(path) };
        let resp = self.channel.send_command("LIST", args).await?;

        if resp.is_completion() {
            // Nothing to send; some servers answer 226 straight away.
            log::debug!("[ftp:{}] LIST {} completed without data", self.id, path);
            return Ok(Vec::new());
        }
        if !resp.is_preliminary() {
            return Err(FtpError::from_reply(
                FtpErrorKind::List,
                resp.code,
                &format!("LIST {} failed: {}", path, resp.text()),
            ));
        }

        let mut task = TransferTask::new(path, TransferDirection::Download);
        let data = async {
            let mut stream = connector.establish(limit).await?;
            collect(&mut stream, MAX_LISTING_LEN, limit, &mut task).await
        }
        .await;

        let done = self.channel.read_reply().await?;
        let payload = data.map_err(|e| e.during(FtpErrorKind::List))?;
        if !done.is_completion() {
            return Err(FtpError::from_reply(
                FtpErrorKind::List,
                done.code,
                &format!("LIST {} failed: {}", path, done.text()),
            ));
        }

        let text = String::from_utf8_lossy(&payload);
        let entries = parser::parse_listing(&text);
        log::debug!(
            "[ftp:{}] LIST {} -> {} entries ({} bytes)",
            self.id,
            path,
            entries.len(),
            payload.len()
        );
        Ok(entries)
    }

    // ─── MKD ─────────────────────────────────────────────────────

    /// Create a directory; returns the path reported by the server.
    pub async fn make_directory(&mut self, path: &str) -> FtpResult<String> {
        self.ensure_connected().await?;
        let resp = self.channel.send_command("MKD", Some(path)).await?;
        if !resp.is_completion() {
            return Err(FtpError::from_reply(
                FtpErrorKind::Mkdir,
                resp.code,
                &format!("MKD {} failed: {}", path, resp.text()),
            ));
        }
        let created = parse_quoted_path(&resp.text()).unwrap_or_else(|| path.to_string());
        log::info!("[ftp:{}] created directory {}", self.id, created);
        Ok(created)
    }

    // ─── RMD ─────────────────────────────────────────────────────

    /// Remove an empty directory.
    pub async fn remove_directory(&mut self, path: &str) -> FtpResult<()> {
        self.simple_command("RMD", path).await
    }

    // ─── RNFR / RNTO ─────────────────────────────────────────────

    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.ensure_connected().await?;
        let resp = self.channel.send_command("RNFR", Some(from)).await?;
        if resp.code != 350 {
            return Err(FtpError::from_reply(
                FtpErrorKind::CommandRejected,
                resp.code,
                &format!("RNFR {} failed: {}", from, resp.text()),
            ));
        }
        self.simple_command("RNTO", to).await?;
        log::info!("[ftp:{}] renamed {} -> {}", self.id, from, to);
        Ok(())
    }

    /// One command that must be answered with 2xx, else `CommandRejected`.
    pub(crate) async fn simple_command(&mut self, verb: &str, path: &str) -> FtpResult<()> {
        self.ensure_connected().await?;
        let resp = self.channel.send_command(verb, Some(path)).await?;
        if !resp.is_completion() {
            return Err(FtpError::from_reply(
                FtpErrorKind::CommandRejected,
                resp.code,
                &format!("{} {} failed: {}", verb, path, resp.text()),
            ));
        }
        Ok(())
    }

    /// Keep-alive.
    pub async fn noop(&mut self) -> FtpResult<()> {
        self.ensure_connected().await?;
        self.channel.noop().await
    }
}
