//! Unified cart error type.
//!
//! Every failure the reconciler surfaces is a [`CartError`]. None of them is
//! fatal: the cart stays usable and the user is told what happened.

use thiserror::Error;

use crate::reconciler::MergeReport;
use crate::remote::RemoteError;
use crate::storage::StorageError;

/// Failure classification shared by errors and notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Device data was unreadable; recovered as an empty cart, never surfaced.
    StorageCorrupt,
    /// Device storage rejected a write; the in-memory cart is still current.
    StorageUnavailable,
    /// Network or server failure; not retried automatically.
    RemoteUnavailable,
    /// A backend call exceeded its time budget.
    Timeout,
    /// The backend rejected the credential; the cart falls back to the device.
    SessionExpired,
    /// Some device lines could not be moved to the account cart.
    PartialMergeFailure,
}

/// Errors surfaced by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Backend cart call failed.
    #[error("Cart service unavailable: {0}")]
    RemoteUnavailable(#[source] RemoteError),

    /// Backend cart call timed out.
    #[error("Cart service timed out")]
    Timeout,

    /// Credential rejected; the session is now anonymous.
    #[error("Session expired, please sign in again")]
    SessionExpired,

    /// Merge-on-login moved only part of the device cart.
    #[error("{0}")]
    PartialMerge(MergeReport),

    /// Device storage rejected a write.
    #[error("Cart could not be saved on this device: {0}")]
    StorageUnavailable(#[source] StorageError),
}

impl CartError {
    /// Classification for UI mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            Self::Timeout => ErrorKind::Timeout,
            Self::SessionExpired => ErrorKind::SessionExpired,
            Self::PartialMerge(_) => ErrorKind::PartialMergeFailure,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }

    /// Message safe to show to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::RemoteUnavailable(_) => {
                "We couldn't reach your cart right now. Please try again.".to_string()
            }
            Self::Timeout => "Your cart is taking too long to respond. Please try again.".to_string(),
            Self::SessionExpired => {
                "Your session has expired. Please sign in again to see your saved cart.".to_string()
            }
            Self::PartialMerge(report) => report.to_string(),
            Self::StorageUnavailable(_) => {
                "Your cart couldn't be saved on this device.".to_string()
            }
        }
    }
}

impl From<RemoteError> for CartError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::SessionExpired { .. } => Self::SessionExpired,
            RemoteError::Timeout => Self::Timeout,
            other => Self::RemoteUnavailable(other),
        }
    }
}

impl From<StorageError> for CartError {
    fn from(error: StorageError) -> Self {
        Self::StorageUnavailable(error)
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_remote_error() {
        assert!(matches!(
            CartError::from(RemoteError::SessionExpired { status: 401 }),
            CartError::SessionExpired
        ));
        assert!(matches!(
            CartError::from(RemoteError::Timeout),
            CartError::Timeout
        ));
        assert!(matches!(
            CartError::from(RemoteError::Api {
                status: 500,
                message: "boom".to_string()
            }),
            CartError::RemoteUnavailable(_)
        ));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(CartError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(CartError::SessionExpired.kind(), ErrorKind::SessionExpired);
        assert_eq!(
            CartError::PartialMerge(MergeReport::default()).kind(),
            ErrorKind::PartialMergeFailure
        );
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = CartError::RemoteUnavailable(RemoteError::Api {
            status: 500,
            message: "stack trace at db.js:42".to_string(),
        });
        assert!(!err.user_message().contains("db.js"));
        assert!(err.to_string().contains("db.js"));
    }
}
