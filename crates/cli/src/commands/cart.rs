//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! furnish cart show
//! furnish cart add sofa-01 --title "Asgaard sofa" --price 2500000 --quantity 2
//! furnish cart update sofa-01 3
//! furnish cart remove sofa-01
//! furnish cart clear
//! ```

use std::io::Write;

use furnish_core::{ProductId, ProductSnapshot};

use super::{CliError, Context};
use crate::output;

/// Product details supplied on the command line.
pub struct NewLine {
    pub id: String,
    pub title: String,
    pub price: u64,
    pub quantity: u32,
    pub image: Option<String>,
    pub subtitle: Option<String>,
}

/// Print the authoritative cart.
///
/// # Errors
///
/// Returns an error if the cart cannot be read.
pub async fn show(ctx: &Context, out: &mut impl Write, json: bool) -> Result<(), CliError> {
    ctx.cart.refresh().await?;
    let view = ctx.cart.view().await;
    if json {
        serde_json::to_writer_pretty(&mut *out, &view.cart).map_err(std::io::Error::other)?;
        writeln!(out)?;
    } else {
        output::cart(out, &view)?;
    }
    Ok(())
}

/// Add a product.
///
/// # Errors
///
/// Returns an error if the id is blank or the cart rejects the add.
pub async fn add(ctx: &Context, out: &mut impl Write, line: NewLine) -> Result<(), CliError> {
    let mut product = ProductSnapshot::new(ProductId::parse(&line.id)?, line.title, line.price);
    product.image = line.image;
    product.subtitle = line.subtitle;

    ctx.cart.add_to_cart(product, line.quantity).await?;
    output::cart(out, &ctx.cart.view().await)?;
    Ok(())
}

/// Remove a product.
///
/// # Errors
///
/// Returns an error if the id is blank or the cart rejects the removal.
pub async fn remove(ctx: &Context, out: &mut impl Write, id: &str) -> Result<(), CliError> {
    ctx.cart.remove_from_cart(&ProductId::parse(id)?).await?;
    output::cart(out, &ctx.cart.view().await)?;
    Ok(())
}

/// Set a product's quantity; zero or less removes it.
///
/// # Errors
///
/// Returns an error if the id is blank or the cart rejects the update.
pub async fn update(
    ctx: &Context,
    out: &mut impl Write,
    id: &str,
    quantity: i64,
) -> Result<(), CliError> {
    ctx.cart
        .update_quantity(&ProductId::parse(id)?, quantity)
        .await?;
    output::cart(out, &ctx.cart.view().await)?;
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error if the cart rejects the clear.
pub async fn clear(ctx: &Context, out: &mut impl Write) -> Result<(), CliError> {
    ctx.cart.clear_cart().await?;
    output::cart(out, &ctx.cart.view().await)?;
    Ok(())
}
