//! Narrative timeline entries attached to a lead

use crate::{ActivityId, LeadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped narrative log entry for a lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub lead_id: LeadId,
    pub kind: ActivityKind,
    pub summary: String,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        lead_id: LeadId,
        kind: ActivityKind,
        summary: impl Into<String>,
        actor: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            lead_id,
            kind,
            summary: summary.into(),
            actor: actor.into(),
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Intake,
    StatusChange,
    QuoteCreated,
    QuoteAccepted,
    Note,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Intake => "intake",
            ActivityKind::StatusChange => "status_change",
            ActivityKind::QuoteCreated => "quote_created",
            ActivityKind::QuoteAccepted => "quote_accepted",
            ActivityKind::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "intake" => Some(ActivityKind::Intake),
            "status_change" => Some(ActivityKind::StatusChange),
            "quote_created" => Some(ActivityKind::QuoteCreated),
            "quote_accepted" => Some(ActivityKind::QuoteAccepted),
            "note" => Some(ActivityKind::Note),
            _ => None,
        }
    }
}
