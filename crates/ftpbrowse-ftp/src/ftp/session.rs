//! Session — one control channel plus the directory it is browsing.
//!
//! A `Session` is owned by exactly one worker task (see `queue`); nothing
//! else touches its control channel. The directory context is shared with
//! the session's handles so paths can be resolved without a round trip
//! through the worker.

use crate::ftp::client::ControlChannel;
use crate::ftp::error::FtpResult;
use crate::ftp::transfer::{self, DataChannelOptions, DataConnector};
use crate::ftp::types::*;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

// ─── Directory context ───────────────────────────────────────────────

/// Current directory bookkeeping, shared between a session and its handles.
///
/// Pure string state: changing it never talks to the server, and paths are
/// concatenated literally (no `..` or `//` normalisation).
#[derive(Debug, Clone, Default)]
pub struct DirectoryContext(Arc<RwLock<String>>);

impl DirectoryContext {
    pub fn new(directory: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(directory.into())))
    }

    pub fn get(&self) -> String {
        self.0
            .read()
            .map(|d| d.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set(&self, directory: impl Into<String>) {
        let directory = directory.into();
        match self.0.write() {
            Ok(mut d) => *d = directory,
            Err(poisoned) => *poisoned.into_inner() = directory,
        }
    }

    /// `""` → current directory; otherwise `current + "/" + name`.
    ///
    /// With no current directory the bare name is returned, i.e. relative
    /// to the login directory.
    pub fn resolve(&self, name: &str) -> String {
        let current = self.get();
        if name.is_empty() {
            current
        } else if current.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", current, name)
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────

pub struct Session {
    pub(crate) id: String,
    pub(crate) descriptor: ConnectionDescriptor,
    pub(crate) channel: ControlChannel,
    pub(crate) context: DirectoryContext,
    pub(crate) opened_at: DateTime<Utc>,
}

impl Session {
    /// Create an unconnected session pinned to `directory`.
    pub fn new(descriptor: ConnectionDescriptor, directory: impl Into<String>) -> FtpResult<Self> {
        descriptor.validate()?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            descriptor,
            channel: ControlChannel::default(),
            context: DirectoryContext::new(directory),
            opened_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn context(&self) -> &DirectoryContext {
        &self.context
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Connect, log in and switch to binary unless already authenticated.
    ///
    /// A channel that was invalidated by an earlier failure is replaced here.
    pub async fn ensure_connected(&mut self) -> FtpResult<()> {
        if self.channel.is_authenticated() {
            return Ok(());
        }
        if self.channel.state() != ChannelState::Disconnected {
            self.channel.disconnect().await;
        }

        log::info!(
            "[ftp:{}] connecting to {} as '{}'",
            self.id,
            self.descriptor.address(),
            self.descriptor.username
        );
        let mut channel = ControlChannel::connect(&self.descriptor).await?;
        let login = async {
            channel
                .authenticate(&self.descriptor.username, &self.descriptor.password)
                .await?;
            channel.set_binary().await
        };
        if let Err(e) = login.await {
            log::warn!("[ftp:{}] login failed: {}", self.id, e);
            channel.disconnect().await;
            return Err(e);
        }

        self.channel = channel;
        log::info!("[ftp:{}] session ready", self.id);
        Ok(())
    }

    pub fn change_directory_context(&self, path: impl Into<String>) {
        self.context.set(path);
    }

    pub fn resolve_path(&self, name: &str) -> String {
        self.context.resolve(name)
    }

    pub fn current_directory(&self) -> String {
        self.context.get()
    }

    /// Negotiate a data connection in the descriptor's configured mode.
    pub(crate) async fn open_data(&mut self) -> FtpResult<DataConnector> {
        let opts = DataChannelOptions {
            mode: self.descriptor.data_channel_mode(),
            host: &self.descriptor.host,
            data_timeout: self.descriptor.data_timeout(),
            active_bind: self.descriptor.active_bind_address.as_deref(),
        };
        transfer::open_data_channel(&mut self.channel, &opts).await
    }

    pub fn info(&self, closed: bool) -> FtpSessionInfo {
        FtpSessionInfo {
            id: self.id.clone(),
            host: self.descriptor.host.clone(),
            port: self.descriptor.port,
            username: self.descriptor.username.clone(),
            label: self.descriptor.label.clone(),
            current_directory: self.context.get(),
            closed,
            opened_at: self.opened_at,
        }
    }

    /// QUIT and close the control channel. Never fails.
    pub async fn close(&mut self) {
        if self.channel.state() != ChannelState::Disconnected {
            log::info!("[ftp:{}] closing session", self.id);
        }
        self.channel.disconnect().await;
    }
}
