//! User-visible notices.
//!
//! Cart failures are never fatal. They are reported as notices so the UI can
//! show a toast and stay responsive.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ErrorKind;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Failure class, when the notice reports one.
    pub kind: Option<ErrorKind>,
    /// Text to display.
    pub message: String,
}

impl Notice {
    /// A success notice.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            kind: None,
            message: message.into(),
        }
    }

    /// An informational notice.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            kind: None,
            message: message.into(),
        }
    }

    /// A notice reporting a failure.
    #[must_use]
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        let level = match kind {
            ErrorKind::SessionExpired | ErrorKind::StorageUnavailable | ErrorKind::StorageCorrupt => {
                NoticeLevel::Warning
            }
            ErrorKind::RemoteUnavailable | ErrorKind::Timeout | ErrorKind::PartialMergeFailure => {
                NoticeLevel::Error
            }
        };
        Self {
            level,
            kind: Some(kind),
            message: message.into(),
        }
    }
}

/// Receives notices from the cart.
pub trait Notifier: Send + Sync {
    /// Deliver a notice. Must not block.
    fn notify(&self, notice: Notice);
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice);
    }
}

/// Writes notices to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => {
                tracing::error!(kind = ?notice.kind, "{}", notice.message);
            }
            NoticeLevel::Warning => {
                tracing::warn!(kind = ?notice.kind, "{}", notice.message);
            }
            NoticeLevel::Success | NoticeLevel::Info => {
                tracing::info!(level = %notice.level, "{}", notice.message);
            }
        }
    }
}

/// Forwards notices to a channel a UI task drains.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // A closed receiver means the UI is gone; nothing left to tell
        let _ = self.tx.send(notice);
    }
}
