//! Operation queue — serialises every request against one session.
//!
//! Each session is owned by a single spawned worker task. Callers hold a
//! cloneable [`SessionHandle`] and `submit()` operations over an unbounded
//! channel; the worker runs them strictly in submission order, one at a
//! time, so no two command/reply exchanges can interleave on the control
//! channel.
//!
//! Closing a handle cancels everything that has not started yet. The
//! operation already running is allowed to finish its final reply before
//! QUIT is sent.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::session::{DirectoryContext, Session};
use crate::ftp::types::*;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

/// Opaque byte source for uploads (local file, buffer, pipe, ...).
pub type ByteSource = Box<dyn AsyncRead + Unpin + Send>;
/// Opaque byte sink for downloads.
pub type ByteSink = Box<dyn AsyncWrite + Unpin + Send>;

/// One unit of work against a session.
pub enum Operation {
    /// Connect and log in without doing anything else.
    Connect,
    List { path: String },
    Upload { path: String, source: ByteSource },
    Download { path: String, sink: ByteSink },
    MakeDirectory { path: String },
    RemoveDirectory { path: String },
    DeleteFile { path: String },
    Rename { from: String, to: String },
    Noop,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::List { .. } => "list",
            Operation::Upload { .. } => "upload",
            Operation::Download { .. } => "download",
            Operation::MakeDirectory { .. } => "mkdir",
            Operation::RemoveDirectory { .. } => "rmdir",
            Operation::DeleteFile { .. } => "delete",
            Operation::Rename { .. } => "rename",
            Operation::Noop => "noop",
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::List { path }
            | Operation::Upload { path, .. }
            | Operation::Download { path, .. }
            | Operation::MakeDirectory { path }
            | Operation::RemoveDirectory { path }
            | Operation::DeleteFile { path } => write!(f, "{}({:?})", self.name(), path),
            Operation::Rename { from, to } => write!(f, "rename({:?} -> {:?})", from, to),
            _ => f.write_str(self.name()),
        }
    }
}

/// Successful result of an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Listing(Vec<RemoteEntry>),
    /// Bytes moved by an upload or download.
    Transferred(u64),
    /// Path reported by the server for a new directory.
    Created(String),
    Done,
}

type Reply = oneshot::Sender<FtpResult<OperationOutput>>;

enum WorkerMessage {
    Run { op: Operation, reply: Reply },
    Close { ack: oneshot::Sender<()> },
}

/// Cloneable handle to a session's worker.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    context: DirectoryContext,
    closed: Arc<AtomicBool>,
    info: Arc<FtpSessionInfo>,
}

impl SessionHandle {
    /// Move `session` onto its own worker task.
    pub fn spawn(session: Session) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let handle = Self {
            id: session.id().to_string(),
            tx,
            context: session.context().clone(),
            closed: closed.clone(),
            info: Arc::new(session.info(false)),
        };
        tokio::spawn(run_worker(session, rx, closed));
        handle
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue `op`. Its position in the queue is fixed when this returns,
    /// not when the future is first polled.
    pub fn submit(
        &self,
        op: Operation,
    ) -> impl Future<Output = FtpResult<OperationOutput>> + Send + 'static {
        let id = self.id.clone();
        let (reply, rx) = oneshot::channel();
        let queued = if self.is_closed() {
            Err(cancelled(&id, &op))
        } else {
            log::trace!("[ftp:{}] queued {:?}", id, op);
            self.tx
                .send(WorkerMessage::Run { op, reply })
                .map_err(|e| match e.0 {
                    WorkerMessage::Run { op, .. } => cancelled(&id, &op),
                    WorkerMessage::Close { .. } => FtpError::cancelled("Session closed"),
                })
        };
        async move {
            queued?;
            rx.await.unwrap_or_else(|_| {
                Err(FtpError::cancelled("Session worker stopped").with_session(id))
            })
        }
    }

    // ─── Typed wrappers ──────────────────────────────────────────

    pub async fn connect(&self) -> FtpResult<()> {
        self.submit(Operation::Connect).await.map(|_| ())
    }

    pub async fn list_directory(&self, path: &str) -> FtpResult<Vec<RemoteEntry>> {
        match self.submit(Operation::List { path: path.to_string() }).await? {
            OperationOutput::Listing(entries) => Ok(entries),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn upload_file(&self, path: &str, source: ByteSource) -> FtpResult<u64> {
        let op = Operation::Upload {
            path: path.to_string(),
            source,
        };
        match self.submit(op).await? {
            OperationOutput::Transferred(n) => Ok(n),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn download_file(&self, path: &str, sink: ByteSink) -> FtpResult<u64> {
        let op = Operation::Download {
            path: path.to_string(),
            sink,
        };
        match self.submit(op).await? {
            OperationOutput::Transferred(n) => Ok(n),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn create_directory(&self, path: &str) -> FtpResult<String> {
        match self
            .submit(Operation::MakeDirectory { path: path.to_string() })
            .await?
        {
            OperationOutput::Created(p) => Ok(p),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn remove_directory(&self, path: &str) -> FtpResult<()> {
        self.submit(Operation::RemoveDirectory { path: path.to_string() })
            .await
            .map(|_| ())
    }

    pub async fn delete_file(&self, path: &str) -> FtpResult<()> {
        self.submit(Operation::DeleteFile { path: path.to_string() })
            .await
            .map(|_| ())
    }

    pub async fn rename(&self, from: &str, to: &str) -> FtpResult<()> {
        let op = Operation::Rename {
            from: from.to_string(),
            to: to.to_string(),
        };
        self.submit(op).await.map(|_| ())
    }

    pub async fn noop(&self) -> FtpResult<()> {
        self.submit(Operation::Noop).await.map(|_| ())
    }

    // ─── Directory context ───────────────────────────────────────

    pub fn change_directory_context(&self, path: impl Into<String>) {
        self.context.set(path);
    }

    pub fn resolve_path(&self, name: &str) -> String {
        self.context.resolve(name)
    }

    pub fn current_directory(&self) -> String {
        self.context.get()
    }

    pub fn info(&self) -> FtpSessionInfo {
        FtpSessionInfo {
            current_directory: self.context.get(),
            closed: self.is_closed(),
            ..(*self.info).clone()
        }
    }

    /// Cancel queued work, let the running operation finish, then QUIT.
    ///
    /// Idempotent; returns once the control channel is closed.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let (ack, done) = oneshot::channel();
        if self.tx.send(WorkerMessage::Close { ack }).is_ok() {
            let _ = done.await;
        }
    }
}

fn cancelled(id: &str, op: &Operation) -> FtpError {
    FtpError::cancelled(format!("{} cancelled: session closed", op.name())).with_session(id)
}

fn unexpected(output: &OperationOutput) -> FtpError {
    FtpError::protocol_error(format!("Unexpected operation output: {:?}", output))
}

// ─── Worker ──────────────────────────────────────────────────────────

async fn run_worker(
    mut session: Session,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    closed: Arc<AtomicBool>,
) {
    log::debug!("[ftp:{}] worker started", session.id());
    while let Some(msg) = rx.recv().await {
        match msg {
            WorkerMessage::Run { op, reply } => {
                if closed.load(Ordering::SeqCst) {
                    let _ = reply.send(Err(cancelled(session.id(), &op)));
                    continue;
                }
                log::debug!("[ftp:{}] running {:?}", session.id(), op);
                let id = session.id().to_string();
                let result = execute(&mut session, op)
                    .await
                    .map_err(|e| e.with_session(id));
                // The caller may have given up waiting; the result is dropped.
                let _ = reply.send(result);
            }
            WorkerMessage::Close { ack } => {
                rx.close();
                while let Ok(pending) = rx.try_recv() {
                    if let WorkerMessage::Run { op, reply } = pending {
                        let _ = reply.send(Err(cancelled(session.id(), &op)));
                    }
                }
                session.close().await;
                let _ = ack.send(());
                log::debug!("[ftp:{}] worker stopped", session.id());
                return;
            }
        }
    }
    // Every handle was dropped without an explicit close.
    closed.store(true, Ordering::SeqCst);
    session.close().await;
    log::debug!("[ftp:{}] worker stopped (handles dropped)", session.id());
}

async fn execute(session: &mut Session, op: Operation) -> FtpResult<OperationOutput> {
    match op {
        Operation::Connect => session.ensure_connected().await.map(|_| OperationOutput::Done),
        Operation::List { path } => session.list(&path).await.map(OperationOutput::Listing),
        Operation::Upload { path, mut source } => session
            .upload(&path, source.as_mut())
            .await
            .map(OperationOutput::Transferred),
        Operation::Download { path, mut sink } => {
            let result = session.download(&path, sink.as_mut()).await;
            drop(sink);
            result.map(OperationOutput::Transferred)
        }
        Operation::MakeDirectory { path } => session
            .make_directory(&path)
            .await
            .map(OperationOutput::Created),
        Operation::RemoveDirectory { path } => session
            .remove_directory(&path)
            .await
            .map(|_| OperationOutput::Done),
        Operation::DeleteFile { path } => session
            .delete_file(&path)
            .await
            .map(|_| OperationOutput::Done),
        Operation::Rename { from, to } => session
            .rename(&from, &to)
            .await
            .map(|_| OperationOutput::Done),
        Operation::Noop => session.noop().await.map(|_| OperationOutput::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_session() -> Session {
        // Port 9 on localhost is the discard port; nothing answers there in CI.
        let mut d = ConnectionDescriptor::new("127.0.0.1", 9, "u", "p");
        d.connect_timeout_sec = 1;
        Session::new(d, "/pub").unwrap()
    }

    #[tokio::test]
    async fn context_is_resolved_without_the_worker() {
        let handle = SessionHandle::spawn(unreachable_session());
        assert_eq!(handle.resolve_path("a.txt"), "/pub/a.txt");
        handle.change_directory_context("/pub/sub");
        assert_eq!(handle.resolve_path(""), "/pub/sub");
        assert_eq!(handle.info().current_directory, "/pub/sub");
        handle.close().await;
    }

    #[tokio::test]
    async fn submit_after_close_is_cancelled() {
        let handle = SessionHandle::spawn(unreachable_session());
        handle.close().await;
        assert!(handle.is_closed());
        let err = handle.noop().await.unwrap_err();
        assert_eq!(err.kind, crate::ftp::error::FtpErrorKind::Cancelled);
        assert!(handle.info().closed);
    }

    #[tokio::test]
    async fn close_twice_is_harmless() {
        let handle = SessionHandle::spawn(unreachable_session());
        let other = handle.clone();
        handle.close().await;
        other.close().await;
        assert!(other.is_closed());
    }

    #[tokio::test]
    async fn connection_failure_is_reported_with_session_id() {
        let handle = SessionHandle::spawn(unreachable_session());
        let err = handle.list_directory("").await.unwrap_err();
        assert!(matches!(
            err.kind,
            crate::ftp::error::FtpErrorKind::Connect | crate::ftp::error::FtpErrorKind::Timeout
        ));
        assert_eq!(err.session_id.as_deref(), Some(handle.id()));
        handle.close().await;
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn worker_future_can_move_between_threads() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let worker = run_worker(unreachable_session(), rx, Arc::new(AtomicBool::new(false)));
        assert_send(&worker);

        let mut channel = crate::ftp::client::ControlChannel::default();
        let opts = crate::ftp::transfer::DataChannelOptions {
            mode: DataChannelMode::ExtendedActive,
            host: "127.0.0.1",
            data_timeout: std::time::Duration::from_secs(1),
            active_bind: None,
        };
        let negotiation = crate::ftp::transfer::open_data_channel(&mut channel, &opts);
        assert_send(&negotiation);
    }

    #[test]
    fn operation_debug_names_path() {
        let op = Operation::MakeDirectory { path: "/a".into() };
        assert_eq!(format!("{:?}", op), "mkdir(\"/a\")");
    }
}
