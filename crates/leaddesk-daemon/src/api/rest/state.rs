//! Application state for API handlers

use crate::config::QuoteConfig;
use crate::notify::needs_mail;
use crate::rate_limit::RateLimiter;
use leaddesk_storage::LeadDeskStorage;
use leaddesk_types::{LeadDeskEvent, LeadDeskEventEnvelope};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Storage backend
    pub storage: Arc<dyn LeadDeskStorage>,

    /// Event broadcast channel
    pub event_tx: broadcast::Sender<LeadDeskEventEnvelope>,

    /// Queue feeding the notification dispatcher
    pub mail_tx: Option<mpsc::UnboundedSender<LeadDeskEventEnvelope>>,

    /// Limiter for the public endpoints
    pub rate_limiter: Arc<RateLimiter>,

    /// Peers whose `X-Forwarded-For` header keys the limiter
    pub trusted_proxies: Arc<Vec<IpAddr>>,

    /// Quote issuing defaults
    pub quotes: QuoteConfig,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        storage: Arc<dyn LeadDeskStorage>,
        event_tx: broadcast::Sender<LeadDeskEventEnvelope>,
        rate_limiter: Arc<RateLimiter>,
        quotes: QuoteConfig,
    ) -> Self {
        Self {
            storage,
            event_tx,
            mail_tx: None,
            rate_limiter,
            trusted_proxies: Arc::new(Vec::new()),
            quotes,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Attach the notification queue
    pub fn with_mail_queue(
        mut self,
        mail_tx: mpsc::UnboundedSender<LeadDeskEventEnvelope>,
    ) -> Self {
        self.mail_tx = Some(mail_tx);
        self
    }

    /// Peers allowed to name the client through forwarding headers
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = Arc::new(proxies);
        self
    }

    /// Publish a committed change to listeners
    pub fn publish(&self, event: LeadDeskEvent, actor: &str) {
        let envelope = LeadDeskEventEnvelope::new(event).with_actor(actor);
        if let Some(mail_tx) = &self.mail_tx {
            if needs_mail(&envelope.event) && mail_tx.send(envelope.clone()).is_err() {
                tracing::error!(
                    event_id = %envelope.id,
                    lead_id = %envelope.event.lead_id(),
                    "Notification queue closed; confirmation not sent"
                );
            }
        }
        // Having no subscribers is fine.
        let _ = self.event_tx.send(envelope);
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
