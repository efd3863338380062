//! Error types shared by the tab source, the action handler and settings.

use crate::state::{TabId, WindowId};

/// Failures reported by a tab source or a tab command.
#[derive(Debug, thiserror::Error)]
pub enum TabError {
    /// The host has no focused window to query.
    #[error("no current window")]
    NoWindow,

    /// The tab does not exist (any more).
    #[error("tab not found: {0}")]
    TabNotFound(TabId),

    /// The window does not exist.
    #[error("window not found: {0}")]
    WindowNotFound(WindowId),

    /// The host rejected or failed the request.
    #[error("host request failed: {0}")]
    Host(String),
}

/// Failures while reading or writing panel settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings io: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings format: {0}")]
    Format(#[from] serde_json::Error),

    #[error("settings path has no parent directory")]
    NoParent,
}
