//! High-level orchestrator — keeps the open sessions by id.
//!
//! The registry lock is only held to look a handle up; every network
//! operation runs on the session's own worker, so independent sessions
//! never wait on each other.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::queue::{ByteSink, ByteSource, SessionHandle};
use crate::ftp::session::Session;
use crate::ftp::types::*;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared service state for the application layer.
pub type FtpServiceState = Arc<FtpService>;

#[derive(Default)]
pub struct FtpService {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl FtpService {
    pub fn new() -> FtpServiceState {
        Arc::new(Self::default())
    }

    async fn handle(&self, session_id: &str) -> FtpResult<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| FtpError::session_not_found(session_id))
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Register a session pinned to `directory`. The connection is made
    /// lazily by the first operation.
    pub async fn open_session(
        &self,
        descriptor: ConnectionDescriptor,
        directory: &str,
    ) -> FtpResult<String> {
        let session = Session::new(descriptor, directory)?;
        let handle = SessionHandle::spawn(session);
        let id = handle.id().to_string();
        info!(
            "[ftp:{}] session opened for {} in '{}'",
            id,
            handle.info().host,
            directory
        );
        self.sessions.write().await.insert(id.clone(), handle);
        Ok(id)
    }

    /// Cancel queued work, finish the running operation, then QUIT.
    pub async fn close_session(&self, session_id: &str) -> FtpResult<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| FtpError::session_not_found(session_id))?;
        handle.close().await;
        info!("[ftp:{}] session closed", session_id);
        Ok(())
    }

    pub async fn close_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.close().await;
        }
    }

    pub async fn session_info(&self, session_id: &str) -> FtpResult<FtpSessionInfo> {
        Ok(self.handle(session_id).await?.info())
    }

    pub async fn list_sessions(&self) -> Vec<FtpSessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(SessionHandle::info)
            .collect()
    }

    /// Clone of the session's handle, for callers that want to drive it
    /// directly.
    pub async fn session(&self, session_id: &str) -> FtpResult<SessionHandle> {
        self.handle(session_id).await
    }

    // ─── Operations ──────────────────────────────────────────────

    pub async fn list_directory(&self, session_id: &str, path: &str) -> FtpResult<Vec<RemoteEntry>> {
        self.handle(session_id).await?.list_directory(path).await
    }

    pub async fn upload_file(
        &self,
        session_id: &str,
        path: &str,
        source: ByteSource,
    ) -> FtpResult<u64> {
        self.handle(session_id).await?.upload_file(path, source).await
    }

    pub async fn download_file(
        &self,
        session_id: &str,
        path: &str,
        sink: ByteSink,
    ) -> FtpResult<u64> {
        self.handle(session_id).await?.download_file(path, sink).await
    }

    pub async fn create_directory(&self, session_id: &str, path: &str) -> FtpResult<String> {
        self.handle(session_id).await?.create_directory(path).await
    }

    pub async fn delete_file(&self, session_id: &str, path: &str) -> FtpResult<()> {
        self.handle(session_id).await?.delete_file(path).await
    }

    pub async fn remove_directory(&self, session_id: &str, path: &str) -> FtpResult<()> {
        self.handle(session_id).await?.remove_directory(path).await
    }

    pub async fn rename(&self, session_id: &str, from: &str, to: &str) -> FtpResult<()> {
        self.handle(session_id).await?.rename(from, to).await
    }

    /// Keep-alive; `false` when the server did not answer.
    pub async fn ping(&self, session_id: &str) -> FtpResult<bool> {
        let handle = self.handle(session_id).await?;
        Ok(handle.noop().await.is_ok())
    }
}
