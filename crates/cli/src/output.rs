//! Terminal rendering.

use std::io::{self, Write};

use furnish_cart::{CartView, Notice, NoticeLevel};
use furnish_core::Session;

/// Format an amount with thousands separators.
pub fn amount(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render the cart as a table.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn cart(out: &mut impl Write, view: &CartView) -> io::Result<()> {
    let owner = match &view.session {
        Session::Anonymous => "device cart".to_string(),
        Session::Authenticated(auth) => format!("account cart for {}", auth.user_id),
    };

    if view.cart.is_empty() {
        return writeln!(out, "Your {owner} is empty");
    }

    writeln!(out, "Your {owner}:")?;
    for line in &view.cart {
        writeln!(
            out,
            "  {:>3} x {:<32} {:>14}  ({})",
            line.quantity,
            line.product.title,
            amount(line.line_total()),
            line.product_id()
        )?;
    }
    writeln!(
        out,
        "  {} item(s), total {}",
        view.count,
        amount(view.total)
    )
}

/// Render notices gathered while a command ran.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn notices(out: &mut impl Write, notices: &[Notice]) -> io::Result<()> {
    for notice in notices {
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        writeln!(out, "[{tag}] {}", notice.message)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use furnish_core::{AccessToken, AuthSession, Cart, ProductId, ProductSnapshot, UserId};

    use super::*;

    fn view(session: Session) -> CartView {
        let mut cart = Cart::new();
        cart.add(
            ProductSnapshot::new(ProductId::parse("sofa").unwrap(), "Asgaard sofa", 2_500_000),
            NonZeroU32::new(2).unwrap(),
        );
        CartView {
            total: cart.total(),
            count: cart.count(),
            cart,
            session,
            drawer_open: true,
        }
    }

    #[test]
    fn test_amount_groups_thousands() {
        assert_eq!(amount(0), "0");
        assert_eq!(amount(999), "999");
        assert_eq!(amount(1_000), "1,000");
        assert_eq!(amount(5_500_000), "5,500,000");
    }

    #[test]
    fn test_cart_table() {
        let mut out = Vec::new();
        cart(&mut out, &view(Session::Anonymous)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Your device cart:"));
        assert!(text.contains("Asgaard sofa"));
        assert!(text.contains("5,000,000"));
        assert!(text.contains("2 item(s), total 5,000,000"));
    }

    #[test]
    fn test_account_cart_header() {
        let session = Session::Authenticated(AuthSession::new(
            UserId::parse("u1").unwrap(),
            AccessToken::new("t"),
        ));
        let mut out = Vec::new();
        cart(&mut out, &view(session)).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Your account cart for u1:"));
    }

    #[test]
    fn test_notices() {
        let mut out = Vec::new();
        notices(
            &mut out,
            &[Notice::success("Added"), Notice::info("Merged")],
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[ok] Added\n[info] Merged\n");
    }
}
