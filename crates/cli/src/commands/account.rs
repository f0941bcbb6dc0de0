//! Account commands.
//!
//! # Usage
//!
//! ```bash
//! furnish login -e ada@example.com -p hunter2
//! furnish register -n "Ada" -e ada@example.com -p hunter2
//! furnish whoami
//! furnish logout
//! ```

use std::io::Write;

use secrecy::SecretString;

use furnish_cart::{AuthError, Registration, SignedIn};
use furnish_core::Session;

use super::{CliError, Context};
use crate::{output, persisted};

/// Sign in and merge the device cart into the account.
///
/// # Errors
///
/// Returns an error if the backend rejects the credentials. A failed merge
/// is reported as an error after the session has been saved.
pub async fn login(
    ctx: &Context,
    out: &mut impl Write,
    email: &str,
    password: SecretString,
) -> Result<(), CliError> {
    let signed_in = ctx.auth.login(email, &password).await?;
    start_session(ctx, out, signed_in).await
}

/// Create an account, sign it in and merge the device cart.
///
/// # Errors
///
/// Same as [`login`].
pub async fn register(
    ctx: &Context,
    out: &mut impl Write,
    registration: Registration,
) -> Result<(), CliError> {
    let signed_in = ctx.auth.register(&registration).await?;
    start_session(ctx, out, signed_in).await
}

async fn start_session(
    ctx: &Context,
    out: &mut impl Write,
    signed_in: SignedIn,
) -> Result<(), CliError> {
    let SignedIn { session, profile } = signed_in;
    let label = profile
        .name
        .clone()
        .or_else(|| profile.email.clone())
        .unwrap_or_else(|| profile.id.to_string());

    // A saved session for another account is replaced, never merged into
    let session = Session::Authenticated(session);
    persisted::save(&ctx.storage, &session, profile.email.as_deref())?;
    if let Some(auth) = session.auth() {
        ctx.provider.sign_in(auth.clone());
    }
    writeln!(out, "Signed in as {label}")?;

    let merged = ctx.cart.transition(session).await;
    output::cart(out, &ctx.cart.view().await)?;
    merged?;
    Ok(())
}

/// Sign out. The account cart stays on the backend; the device cart is
/// shown again.
///
/// # Errors
///
/// Returns an error if the saved session cannot be removed.
pub async fn logout(ctx: &Context, out: &mut impl Write) -> Result<(), CliError> {
    let current = ctx.provider.current();
    let Some(auth) = current.auth() else {
        writeln!(out, "Not signed in")?;
        return Ok(());
    };

    ctx.auth.logout(auth).await;
    persisted::save(&ctx.storage, &Session::Anonymous, None)?;
    ctx.provider.sign_out();
    ctx.cart.transition(Session::Anonymous).await?;

    writeln!(out, "Signed out")?;
    output::cart(out, &ctx.cart.view().await)?;
    Ok(())
}

/// Show the signed-in account.
///
/// # Errors
///
/// Returns `NotSignedIn` when the backend no longer accepts the saved
/// session.
pub async fn whoami(ctx: &Context, out: &mut impl Write) -> Result<(), CliError> {
    let current = ctx.provider.current();
    let Some(auth) = current.auth() else {
        writeln!(out, "Not signed in; using the device cart")?;
        return Ok(());
    };

    match ctx.auth.current_user(&auth.access_token).await {
        Ok(profile) => {
            writeln!(out, "User:  {}", profile.id)?;
            if let Some(name) = &profile.name {
                writeln!(out, "Name:  {name}")?;
            }
            if let Some(email) = profile
                .email
                .or_else(|| persisted::email(&ctx.storage))
            {
                writeln!(out, "Email: {email}")?;
            }
            if let Some(role) = &profile.role {
                writeln!(out, "Role:  {role}")?;
            }
            Ok(())
        }
        Err(AuthError::SessionExpired) => {
            ctx.provider.expire(&auth.user_id);
            persisted::save(&ctx.storage, &Session::Anonymous, None)?;
            Err(CliError::NotSignedIn)
        }
        Err(e) => Err(e.into()),
    }
}
