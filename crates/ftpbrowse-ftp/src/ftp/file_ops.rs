//! File-level operations — upload, download, delete.
//!
//! A transfer is only successful when the bytes went through *and* the
//! server's final reply is 2xx. The final reply is always read, even after
//! a data-connection failure, so the control channel stays in step.

use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::session::Session;
use crate::ftp::transfer::{pump, DataConnector};
use crate::ftp::types::*;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

impl Session {
    // ─── UPLOAD (STOR) ───────────────────────────────────────────

    /// Stream `source` to the remote `path`; returns the bytes written.
    pub async fn upload(
        &mut self,
        path: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> FtpResult<u64> {
        self.ensure_connected().await?;
        let limit = self.descriptor.data_timeout();
        let mut task = TransferTask::new(path, TransferDirection::Upload);

        let connector = self.begin_transfer("STOR", path).await?;
        let data = async {
            let mut stream = connector.establish(limit).await?;
            pump(&mut *source, &mut stream, limit, &mut task).await?;
            stream.shutdown().await?;
            Ok::<u64, FtpError>(task.bytes_transferred)
        }
        .await;

        self.finish_transfer(&task, data).await
    }

    // ─── DOWNLOAD (RETR) ─────────────────────────────────────────

    /// Stream the remote `path` into `sink`; returns the bytes read.
    pub async fn download(
        &mut self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<u64> {
        self.ensure_connected().await?;
        let limit = self.descriptor.data_timeout();
        let mut task = TransferTask::new(path, TransferDirection::Download);

        let connector = self.begin_transfer("RETR", path).await?;
        let data = async {
            let mut stream = connector.establish(limit).await?;
            pump(&mut stream, &mut *sink, limit, &mut task).await
        }
        .await;

        self.finish_transfer(&task, data).await
    }

    /// Open the data connection and send the transfer command; the server
    /// must answer with a preliminary (1xx) reply.
    async fn begin_transfer(&mut self, verb: &str, path: &str) -> FtpResult<DataConnector> {
        let connector = self
            .open_data()
            .await
            .map_err(|e| e.during(FtpErrorKind::Transfer))?;
        let resp = self.channel.send_command(verb, Some(path)).await?;
        if !resp.is_preliminary() {
            return Err(FtpError::from_reply(
                FtpErrorKind::Transfer,
                resp.code,
                &format!("{} {} refused: {}", verb, path, resp.text()),
            )
            .with_bytes(0));
        }
        Ok(connector)
    }

    /// Drain the final reply and combine it with the data-side outcome.
    async fn finish_transfer(
        &mut self,
        task: &TransferTask,
        data: FtpResult<u64>,
    ) -> FtpResult<u64> {
        let bytes = task.bytes_transferred;
        let verb = match task.direction {
            TransferDirection::Upload => "STOR",
            TransferDirection::Download => "RETR",
        };

        let done = self
            .channel
            .read_reply()
            .await
            .map_err(|e| e.with_bytes(bytes))?;

        if let Err(e) = data {
            log::warn!(
                "[ftp:{}] {} {} failed after {} bytes: {}",
                self.id,
                verb,
                task.remote_path,
                bytes,
                e
            );
            return Err(e.during(FtpErrorKind::Transfer).with_bytes(bytes));
        }
        if !done.is_completion() {
            return Err(FtpError::from_reply(
                FtpErrorKind::Transfer,
                done.code,
                &format!("{} {} failed: {}", verb, task.remote_path, done.text()),
            )
            .with_bytes(bytes));
        }

        log::info!(
            "[ftp:{}] {} {} done: {} bytes ({} B/s)",
            self.id,
            verb,
            task.remote_path,
            bytes,
            task.speed_bps()
        );
        Ok(bytes)
    }

    // ─── DELE ────────────────────────────────────────────────────

    pub async fn delete_file(&mut self, path: &str) -> FtpResult<()> {
        self.simple_command("DELE", path).await?;
        log::info!("[ftp:{}] deleted {}", self.id, path);
        Ok(())
    }
}
