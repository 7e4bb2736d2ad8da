//! Out-of-band notifications
//!
//! Handlers queue mail-worthy events on a dedicated unbounded channel, so a
//! slow mailer never loses a confirmation. The dispatcher drains that queue
//! and hands confirmation emails to a [`Mailer`]. Failures here are logged and
//! never reach HTTP callers.

use async_trait::async_trait;
use leaddesk_storage::LeadDeskStorage;
use leaddesk_types::{LeadDeskEvent, LeadDeskEventEnvelope, LeadId, QuoteId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A rendered email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Delivery seam for outgoing email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Mailer that only records messages in the log
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Confirmation email queued"
        );
        Ok(())
    }
}

/// Whether an event results in outgoing mail
pub fn needs_mail(event: &LeadDeskEvent) -> bool {
    matches!(event, LeadDeskEvent::QuoteAccepted { .. })
}

/// Turns domain events into outgoing mail
pub struct NotificationDispatcher {
    storage: Arc<dyn LeadDeskStorage>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationDispatcher {
    pub fn new(storage: Arc<dyn LeadDeskStorage>, mailer: Arc<dyn Mailer>) -> Self {
        Self { storage, mailer }
    }

    /// Drain the mail queue until every sender is gone
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<LeadDeskEventEnvelope>) {
        while let Some(envelope) = rx.recv().await {
            self.handle(&envelope).await;
        }
        tracing::debug!("Notification dispatcher stopped");
    }

    pub async fn handle(&self, envelope: &LeadDeskEventEnvelope) {
        if let LeadDeskEvent::QuoteAccepted {
            lead_id,
            quote_id,
            client_email,
            ..
        } = &envelope.event
        {
            let Some(to) = client_email.clone() else {
                tracing::warn!(%quote_id, "Accepted quote has no client email; skipping confirmation");
                return;
            };

            let message = match self.acceptance_confirmation(lead_id, quote_id, to).await {
                Some(message) => message,
                None => return,
            };

            if let Err(e) = self.mailer.send(message).await {
                tracing::error!(%quote_id, error = %e, "Failed to send acceptance confirmation");
            }
        }
    }

    async fn acceptance_confirmation(
        &self,
        lead_id: &LeadId,
        quote_id: &QuoteId,
        to: String,
    ) -> Option<EmailMessage> {
        let lead = match self.storage.get_lead(lead_id).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                tracing::warn!(%lead_id, "Lead for accepted quote not found");
                return None;
            }
            Err(e) => {
                tracing::error!(%lead_id, error = %e, "Failed to load lead for confirmation");
                return None;
            }
        };
        let quote = match self.storage.get_quote(quote_id).await {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                tracing::warn!(%quote_id, "Accepted quote not found");
                return None;
            }
            Err(e) => {
                tracing::error!(%quote_id, error = %e, "Failed to load quote for confirmation");
                return None;
            }
        };

        let accepted_on = quote
            .accepted_at
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();

        Some(EmailMessage {
            to,
            subject: format!(
                "Quote accepted: {} ({})",
                lead.project.title, lead.reference
            ),
            body: format!(
                "Dear {},\n\nthank you for accepting version {} of our quote for \"{}\" \
                 on {}.\nAgreed total: {}.\n\nWe will be in touch shortly to schedule the work.\n",
                lead.client.name,
                quote.version,
                lead.project.title,
                accepted_on,
                quote.display_total()
            ),
        })
    }
}
