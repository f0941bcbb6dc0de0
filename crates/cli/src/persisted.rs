//! Session record kept between invocations.
//!
//! Stored as JSON in the same device storage as the cart, under its own key.

use serde::{Deserialize, Serialize};

use furnish_cart::{KeyValueStore, StorageError};
use furnish_core::{AccessToken, AuthSession, Session, UserId};

/// Storage key for the signed-in session.
pub const SESSION_KEY: &str = "session";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    user_id: UserId,
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

/// Read the saved session; anything unreadable counts as signed out.
pub fn load<S: KeyValueStore>(storage: &S) -> Session {
    let raw = match storage.get(SESSION_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Session::Anonymous,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read saved session");
            return Session::Anonymous;
        }
    };

    match serde_json::from_str::<SessionRecord>(&raw) {
        Ok(record) if !record.access_token.trim().is_empty() => Session::Authenticated(
            AuthSession::new(record.user_id, AccessToken::new(record.access_token)),
        ),
        Ok(_) => Session::Anonymous,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable saved session");
            Session::Anonymous
        }
    }
}

/// Save `session`, or forget the saved one when anonymous.
///
/// # Errors
///
/// Returns the storage error if the write fails.
pub fn save<S: KeyValueStore>(
    storage: &S,
    session: &Session,
    email: Option<&str>,
) -> Result<(), StorageError> {
    let Some(auth) = session.auth() else {
        return storage.remove(SESSION_KEY);
    };

    let record = SessionRecord {
        user_id: auth.user_id.clone(),
        access_token: auth.access_token.expose().to_string(),
        email: email.map(str::to_string),
    };
    let json = serde_json::to_string(&record).map_err(|e| StorageError::Io {
        key: SESSION_KEY.to_string(),
        source: std::io::Error::other(e),
    })?;
    storage.set(SESSION_KEY, &json)
}

/// Email saved alongside the session, if any.
pub fn email<S: KeyValueStore>(storage: &S) -> Option<String> {
    let raw = storage.get(SESSION_KEY).ok()??;
    serde_json::from_str::<SessionRecord>(&raw).ok()?.email
}
