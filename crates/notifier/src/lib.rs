//! Email notification delivery for wishlist alerts.
//!
//! [`EmailNotifier`] composes the alert for a (user, stock, wishlist) triple and
//! hands it to a [`MailTransport`]. Transport failures never escape `dispatch`;
//! they are logged and reported as `false` so the caller decides escalation.

pub mod email;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use stockpulse_common::config::AppConfig;

pub use email::{EmailMessage, EmailNotifier};
pub use transport::{MailTransport, NotifierError, ResendTransport, SimulatedTransport};

/// Pick the transport the configuration asks for.
///
/// Resend is used only when both `RESEND_API_KEY` and `EMAIL_FROM` are set;
/// otherwise emails are simulated (delayed and logged).
pub fn transport_from_config(config: &AppConfig) -> Arc<dyn MailTransport> {
    match (&config.resend_api_key, &config.email_from) {
        (Some(api_key), Some(from)) => {
            tracing::info!(from = %from, "Email delivery via Resend");
            Arc::new(ResendTransport::new(api_key.clone(), from.clone()))
        }
        _ => {
            tracing::info!(
                delay_ms = config.simulated_send_delay_ms,
                "Email delivery simulated (RESEND_API_KEY/EMAIL_FROM not set)"
            );
            Arc::new(SimulatedTransport::new(Duration::from_millis(
                config.simulated_send_delay_ms,
            )))
        }
    }
}
