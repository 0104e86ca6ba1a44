//! Wishlist alert composition and dispatch.

use std::sync::Arc;

use stockpulse_common::types::{RuleType, Stock, User, Wishlist};

use crate::transport::MailTransport;

/// Fixed closing line of every alert body.
const BODY_TRAILER: &str =
    "Please buy the stock quickly, before price drops or rises. Thank you for choosing Stock Pulse.";

/// A fully composed alert ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Composes wishlist alerts and dispatches them through a [`MailTransport`].
#[derive(Clone)]
pub struct EmailNotifier {
    transport: Arc<dyn MailTransport>,
}

impl EmailNotifier {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    /// Coarse syntactic recipient check: non-blank, contains `@` and `.`, and
    /// longer than five UTF-16 code units (measured untrimmed). Blank means
    /// nothing but characters up to U+0020. Not RFC validation.
    pub fn is_valid_recipient(email: &str) -> bool {
        if email.trim_matches(|c: char| c <= '\u{20}').is_empty() {
            return false;
        }
        email.contains('@') && email.contains('.') && email.encode_utf16().count() > 5
    }

    /// Human phrase for the wishlist rule, e.g. "up by 5%".
    pub fn describe_rule(wishlist: &Wishlist) -> String {
        match wishlist.rule() {
            RuleType::PercentageIncrease => format!("up by {}", wishlist.rule_value_in_percent),
            RuleType::PercentageDrop => format!("down by {}", wishlist.rule_value_in_percent),
            RuleType::Other => "meeting your criteria".to_string(),
        }
    }

    pub fn compose(user: &User, stock: &Stock, wishlist: &Wishlist) -> EmailMessage {
        EmailMessage {
            to: user.email_address().to_string(),
            subject: format!("Stock Alert - {}", stock.name),
            body: format!(
                "Your wishlisted stock {} is {}. {}",
                stock.name,
                Self::describe_rule(wishlist),
                BODY_TRAILER
            ),
        }
    }

    /// Compose and send the alert. Returns `false` if the transport fails.
    pub async fn dispatch(&self, user: &User, stock: &Stock, wishlist: &Wishlist) -> bool {
        let message = Self::compose(user, stock, wishlist);

        tracing::info!(
            to = %message.to,
            user = user.display_name(),
            subject = %message.subject,
            transport = self.transport.name(),
            "Sending email notification"
        );

        match self
            .transport
            .send(&message.to, &message.subject, &message.body)
            .await
        {
            Ok(()) => {
                tracing::info!(to = %message.to, "Email notification sent");
                true
            }
            Err(e) => {
                tracing::error!(
                    to = %message.to,
                    user = user.display_name(),
                    error = %e,
                    "Failed to send email notification"
                );
                false
            }
        }
    }
}
