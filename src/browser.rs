//! Headless files-screen controller.
//!
//! Everything a remote-files screen decides, with nothing it renders: one
//! screen pins one remote directory, lists it, turns taps into navigation
//! decisions and turns mutating operations into [`Notice`]s for whatever
//! presentation layer sits on top. Mutations never refresh implicitly;
//! callers call [`FilesScreen::refresh`] again.

use ftpbrowse_ftp::{ConnectionDescriptor, FtpError, FtpResult, RemoteEntry, Session, SessionHandle};
use std::path::Path;
use tokio::fs::File;

/// Outcome of listing the pinned directory.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    /// The directory exists and has no entries.
    Empty,
    Entries(Vec<RemoteEntry>),
}

/// What the UI should do after the user picks an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// Open a new screen pinned to `directory`.
    EnterDirectory { directory: String },
    /// Show the file action sheet for this entry.
    FileActions(RemoteEntry),
}

/// Transient success/failure message for a mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub success: bool,
    pub message: &'static str,
    /// Error text for a detailed view.
    pub detail: Option<String>,
}

impl Notice {
    fn from_result<T>(result: &FtpResult<T>, ok: &'static str, failed: &'static str) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                message: ok,
                detail: None,
            },
            Err(e) => Self {
                success: false,
                message: failed,
                detail: Some(e.to_string()),
            },
        }
    }
}

pub struct FilesScreen {
    handle: SessionHandle,
}

impl FilesScreen {
    /// Start a session pinned to `directory` (`""` = login directory).
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(descriptor: ConnectionDescriptor, directory: &str) -> FtpResult<Self> {
        let session = Session::new(descriptor, directory)?;
        Ok(Self {
            handle: SessionHandle::spawn(session),
        })
    }

    /// The directory this screen lists; kept by the session.
    pub fn directory(&self) -> String {
        self.handle.current_directory()
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub async fn refresh(&self) -> FtpResult<Listing> {
        let entries = self
            .handle
            .list_directory(&self.handle.resolve_path(""))
            .await?;
        tracing::debug!("{} entries in '{}'", entries.len(), self.directory());
        Ok(if entries.is_empty() {
            Listing::Empty
        } else {
            Listing::Entries(entries)
        })
    }

    pub fn activate(&self, entry: &RemoteEntry) -> Navigation {
        if entry.is_directory() {
            Navigation::EnterDirectory {
                directory: self.handle.resolve_path(&entry.name),
            }
        } else {
            Navigation::FileActions(entry.clone())
        }
    }

    /// Upload a local file into the pinned directory under its own name.
    pub async fn upload_local_file(&self, local: &Path) -> Notice {
        let result = self.upload_inner(local).await;
        if let Err(e) = &result {
            tracing::warn!("upload of {:?} failed: {}", local, e);
        }
        Notice::from_result(&result, "Upload completed", "Upload failed")
    }

    async fn upload_inner(&self, local: &Path) -> FtpResult<u64> {
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FtpError::invalid_config(format!("No file name in {:?}", local)))?;
        let file = File::open(local).await?;
        let remote = self.handle.resolve_path(name);
        self.handle.upload_file(&remote, Box::new(file)).await
    }

    /// Download `entry` from the pinned directory to `local`.
    pub async fn download_entry(&self, entry: &RemoteEntry, local: &Path) -> Notice {
        let result = async {
            let file = File::create(local).await?;
            let remote = self.handle.resolve_path(&entry.name);
            self.handle.download_file(&remote, Box::new(file)).await
        }
        .await;
        Notice::from_result(&result, "Download completed", "Download failed")
    }

    pub async fn create_directory(&self, name: &str) -> Notice {
        let result = self
            .handle
            .create_directory(&self.handle.resolve_path(name))
            .await;
        Notice::from_result(&result, "Directory created", "Directory creation failed")
    }

    pub async fn delete_entry(&self, entry: &RemoteEntry) -> Notice {
        let path = self.handle.resolve_path(&entry.name);
        let result = if entry.is_directory() {
            self.handle.remove_directory(&path).await
        } else {
            self.handle.delete_file(&path).await
        };
        Notice::from_result(&result, "Deleted", "Delete failed")
    }

    pub async fn rename_entry(&self, entry: &RemoteEntry, new_name: &str) -> Notice {
        let result = self
            .handle
            .rename(
                &self.handle.resolve_path(&entry.name),
                &self.handle.resolve_path(new_name),
            )
            .await;
        Notice::from_result(&result, "Renamed", "Rename failed")
    }

    /// Log out and disconnect.
    pub async fn close(self) {
        self.handle.close().await;
    }
}
