//! LeadDesk Types - Core domain types for the consultancy backoffice
//!
//! ## Key Concepts
//!
//! - **Lead**: a prospective client project moving through the sales pipeline
//! - **QuoteVersion**: a priced, versioned proposal with a client-facing acceptance link
//! - **Activity**: narrative timeline entry attached to a lead
//! - **AuditLogEntry**: append-only, field-level change record
//! - **Events**: domain events published after a committed change

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod activity;
pub mod audit;
pub mod events;
pub mod ids;
pub mod lead;
pub mod quote;

pub use activity::{Activity, ActivityKind};
pub use audit::{AuditContext, AuditEntityType, AuditLogEntry, FieldChange};
pub use events::{LeadDeskEvent, LeadDeskEventEnvelope};
pub use ids::{ActivityId, AuditEntryId, LeadId, ParseIdError, QuoteId};
pub use lead::{ClientContact, Lead, LeadStatus, ProjectDetails, UnknownLeadStatus};
pub use quote::{
    format_minor, AcceptanceCheck, AcceptanceHash, LineItem, QuoteStatus, QuoteVersion,
};
