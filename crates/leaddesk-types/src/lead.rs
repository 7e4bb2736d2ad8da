//! Lead types for pipeline tracking
//!
//! A Lead is a prospective client project. It moves left to right across the
//! pipeline board until it either becomes an order or is lost.

use crate::LeadId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A prospective client project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Unique lead identifier
    pub id: LeadId,

    /// Human-facing reference, e.g. `L-20261018-3FA2`
    pub reference: String,

    /// Client contact details
    pub client: ClientContact,

    /// Project metadata
    pub project: ProjectDetails,

    /// Current pipeline status
    pub status: LeadStatus,

    /// Intake channel (website, referral, phone, ...)
    pub source: String,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Build a freshly captured lead in the `new` column
    pub fn intake(
        client: ClientContact,
        project: ProjectDetails,
        source: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = LeadId::generate();
        Self {
            reference: Self::reference_for(&id, now),
            id,
            client,
            project,
            status: LeadStatus::New,
            source: source.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the human reference from the intake date and the id
    pub fn reference_for(id: &LeadId, created_at: DateTime<Utc>) -> String {
        let simple = id.as_uuid().simple().to_string();
        format!(
            "L-{}-{}",
            created_at.format("%Y%m%d"),
            simple[..4].to_ascii_uppercase()
        )
    }
}

/// Client contact details captured at intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientContact {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Project metadata captured at intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_address: Option<String>,
    /// Requested engineering service (structural, geotechnical, ...)
    #[serde(default)]
    pub service: String,
}

/// Pipeline status of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Quoted,
    Order,
    Lost,
}

impl LeadStatus {
    /// Board columns, in pipeline order
    pub const PIPELINE: [LeadStatus; 6] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Quoted,
        LeadStatus::Order,
        LeadStatus::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Quoted => "quoted",
            LeadStatus::Order => "order",
            LeadStatus::Lost => "lost",
        }
    }

    /// `order` and `lost` close the lead
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::Order | LeadStatus::Lost)
    }

    /// Whether the lead has received at least one quote
    pub fn reached_quote(&self) -> bool {
        matches!(self, LeadStatus::Quoted | LeadStatus::Order)
    }

    /// Statuses that are promoted to `quoted` when a quote is issued
    pub fn precedes_quote(&self) -> bool {
        matches!(
            self,
            LeadStatus::New | LeadStatus::Contacted | LeadStatus::Qualified
        )
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLeadStatus(pub String);

impl fmt::Display for UnknownLeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown lead status '{}'; expected one of: new, contacted, qualified, quoted, order, lost",
            self.0
        )
    }
}

impl std::error::Error for UnknownLeadStatus {}

impl FromStr for LeadStatus {
    type Err = UnknownLeadStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        LeadStatus::PIPELINE
            .into_iter()
            .find(|status| status.as_str() == lowered)
            .ok_or_else(|| UnknownLeadStatus(s.to_string()))
    }
}
