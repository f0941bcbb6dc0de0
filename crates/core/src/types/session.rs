//! Session identity types.
//!
//! A [`Session`] is either anonymous or authenticated. It is passed to the
//! cart explicitly; nothing in Furnish keeps it in global state.

use core::fmt;

use secrecy::{ExposeSecret, SecretString};

use super::id::UserId;

/// Bearer credential for the backend API.
///
/// Wraps a [`SecretString`] so the token never shows up in `Debug` output
/// or logs.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token for use in an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// An authenticated identity.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Backend user id.
    pub user_id: UserId,
    /// Credential presented on every cart call.
    pub access_token: AccessToken,
}

impl AuthSession {
    /// Create an authenticated session.
    #[must_use]
    pub const fn new(user_id: UserId, access_token: AccessToken) -> Self {
        Self {
            user_id,
            access_token,
        }
    }
}

/// Current identity of the user.
///
/// Exactly one state is active at a time. `Anonymous -> Authenticated`
/// happens on login or registration; `Authenticated -> Anonymous` on logout
/// or credential expiry.
#[derive(Debug, Clone, Default)]
pub enum Session {
    /// No credential; the cart lives on the device.
    #[default]
    Anonymous,
    /// Logged in; the cart lives on the backend.
    Authenticated(AuthSession),
}

impl Session {
    /// Returns `true` for [`Session::Authenticated`].
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The authenticated user id, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(auth) => Some(&auth.user_id),
        }
    }

    /// The authenticated session, if any.
    #[must_use]
    pub const fn auth(&self) -> Option<&AuthSession> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(auth) => Some(auth),
        }
    }

    /// Returns `true` if both sessions belong to the same identity.
    ///
    /// Tokens are not compared: a refreshed token for the same user is the
    /// same identity.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.user_id() == other.user_id()
    }
}

impl From<AuthSession> for Session {
    fn from(auth: AuthSession) -> Self {
        Self::Authenticated(auth)
    }
}
