//! Domain events published after a committed change
//!
//! Events feed the notification dispatcher; they are not persisted.

use crate::{LeadId, LeadStatus, QuoteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all LeadDesk events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDeskEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Actor who triggered the event
    pub actor: Option<String>,

    /// The actual event
    pub event: LeadDeskEvent,
}

impl LeadDeskEventEnvelope {
    pub fn new(event: LeadDeskEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: None,
            event,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeadDeskEvent {
    LeadCreated {
        lead_id: LeadId,
        reference: String,
    },
    LeadStatusChanged {
        lead_id: LeadId,
        from: LeadStatus,
        to: LeadStatus,
    },
    QuoteCreated {
        lead_id: LeadId,
        quote_id: QuoteId,
        version: u32,
    },
    QuoteAccepted {
        lead_id: LeadId,
        quote_id: QuoteId,
        accepted_at: DateTime<Utc>,
        client_email: Option<String>,
    },
}

impl LeadDeskEvent {
    pub fn lead_id(&self) -> LeadId {
        match self {
            LeadDeskEvent::LeadCreated { lead_id, .. }
            | LeadDeskEvent::LeadStatusChanged { lead_id, .. }
            | LeadDeskEvent::QuoteCreated { lead_id, .. }
            | LeadDeskEvent::QuoteAccepted { lead_id, .. } => *lead_id,
        }
    }
}
