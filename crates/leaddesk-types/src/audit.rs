//! Append-only, field-level audit records
//!
//! Audit entries are written in the same transaction as the change they
//! describe and are never updated afterwards.

use crate::AuditEntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Immutable record of a change to one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    pub action: String,
    pub changes: Vec<FieldChange>,
    pub actor: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn record(
        entity_type: AuditEntityType,
        entity_id: impl fmt::Display,
        action: impl Into<String>,
        changes: Vec<FieldChange>,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::generate(),
            entity_type,
            entity_id: entity_id.to_string(),
            action: action.into(),
            changes,
            actor: context.actor.clone(),
            ip: context.ip.clone(),
            user_agent: context.user_agent.clone(),
            created_at: now,
        }
    }

    /// Look up the change recorded for `field`
    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|change| change.field == field)
    }
}

/// Old and new value of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Who made a change and from where
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ip: None,
            user_agent: None,
        }
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityType {
    Lead,
    Quote,
}

impl AuditEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntityType::Lead => "lead",
            AuditEntityType::Quote => "quote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lead" => Some(AuditEntityType::Lead),
            "quote" => Some(AuditEntityType::Quote),
            _ => None,
        }
    }
}
