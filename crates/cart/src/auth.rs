//! Backend auth resource.
//!
//! Login and registration hand back an [`AuthSession`] that the caller
//! publishes through a [`crate::session::SessionProvider`]. Logout is
//! fire-and-forget: the session ends on this side whether or not the
//! backend hears about it.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | login | `POST /auth/login` `{ email, password }` |
//! | register | `POST /auth/register` `{ name, email, password }` |
//! | current user | `GET /auth/me` |
//! | logout | `POST /auth/logout` |

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use furnish_core::{AccessToken, AuthSession, UserId};

use crate::config::ApiConfig;
use crate::remote::{endpoint, error_message};

/// Errors that can occur when calling the auth resource.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password rejected.
    #[error("Login failed: {0}")]
    InvalidCredentials(String),

    /// The access token is no longer accepted.
    #[error("Session expired")]
    SessionExpired,

    /// The call did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure.
    #[error("HTTP error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Backend answered with a body that could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client could not be constructed.
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl AuthError {
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(error)
        }
    }
}

/// Account details returned by the auth resource.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    /// Backend user id.
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Result of a successful login or registration.
#[derive(Debug, Clone)]
pub struct SignedIn {
    /// Session to publish.
    pub session: AuthSession,
    /// Account the session belongs to.
    pub profile: UserProfile,
}

/// New account details.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    user: UserProfile,
}

/// Client for the backend auth resource.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: reqwest::Client,
    base_url: Url,
}

impl AuthClient {
    /// Create a new auth client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry a path or the HTTP
    /// client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, AuthError> {
        if config.base_url.cannot_be_a_base() {
            return Err(AuthError::Config(format!(
                "base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` when the backend rejects the login.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<SignedIn, AuthError> {
        let body = LoginRequest {
            email,
            password: password.expose_secret(),
        };
        let signed_in = self.issue(&["auth", "login"], &body).await?;
        info!(user_id = %signed_in.profile.id, "Logged in");
        Ok(signed_in)
    }

    /// Create an account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` when the backend rejects the details
    /// (for example, an email already in use).
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<SignedIn, AuthError> {
        let body = RegisterRequest {
            name: &registration.name,
            email: &registration.email,
            password: registration.password.expose_secret(),
        };
        let signed_in = self.issue(&["auth", "register"], &body).await?;
        info!(user_id = %signed_in.profile.id, "Registered");
        Ok(signed_in)
    }

    /// Look up the account behind `token`.
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired` when the token is rejected.
    #[instrument(skip_all)]
    pub async fn current_user(&self, token: &AccessToken) -> Result<UserProfile, AuthError> {
        let url = endpoint(&self.base_url, &["auth", "me"]);
        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(AuthError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(AuthError::from_transport)?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::SessionExpired);
        }
        if !status.is_success() {
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))
    }

    /// Tell the backend the session ended.
    ///
    /// Failures are logged and swallowed.
    #[instrument(skip_all, fields(user_id = %session.user_id))]
    pub async fn logout(&self, session: &AuthSession) {
        let url = endpoint(&self.base_url, &["auth", "logout"]);
        let result = self
            .client
            .post(url)
            .bearer_auth(session.access_token.expose())
            .json(&serde_json::json!({}))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => debug!("Backend logout acknowledged"),
            Ok(response) => warn!(status = %response.status(), "Backend logout rejected"),
            Err(e) => warn!(error = %e, "Backend logout failed"),
        }
    }

    async fn issue<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<SignedIn, AuthError> {
        let url = endpoint(&self.base_url, segments);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(AuthError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(AuthError::from_transport)?;

        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            return Err(AuthError::InvalidCredentials(error_message(&text)));
        }
        if !status.is_success() {
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let tokens: TokenResponse =
            serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))?;
        if tokens.access_token.trim().is_empty() {
            return Err(AuthError::Parse("empty access token".to_string()));
        }

        Ok(SignedIn {
            session: AuthSession::new(
                tokens.user.id.clone(),
                AccessToken::new(tokens.access_token),
            ),
            profile: tokens.user,
        })
    }
}
