//! Headless remote-files browser built on the `ftpbrowse-ftp` core.
//!
//! - `logging` — subscriber bootstrap
//! - `settings` — JSON client settings
//! - `browser` — files-screen controller

pub mod browser;
pub mod logging;
pub mod settings;

pub use browser::{FilesScreen, Listing, Navigation, Notice};
pub use ftpbrowse_ftp::*;
pub use logging::init_logging;
pub use settings::{ClientSettings, SettingsError, SettingsStore};
