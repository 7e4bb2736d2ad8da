//! In-memory reference implementation of the LeadDesk storage traits.
//!
//! All tables live behind one lock so that each multi-record change is applied
//! atomically, mirroring the transaction boundary of the PostgreSQL backend.

use crate::model::{
    AcceptQuote, AcceptedQuote, AuditFilter, CreatedQuote, LeadFilter, LeadTransition,
    NewQuoteVersion, QueryWindow,
};
use crate::records::{plan_acceptance, plan_intake, plan_quote, plan_transition};
use crate::traits::{
    AcceptanceStore, ActivityStore, AuditStore, LeadDeskStorage, LeadStore, QuoteStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leaddesk_types::{
    AcceptanceHash, Activity, AuditContext, AuditLogEntry, Lead, LeadId, LeadStatus, QuoteId,
    QuoteVersion,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    leads: HashMap<LeadId, Lead>,
    quotes: HashMap<QuoteId, QuoteVersion>,
    quotes_by_hash: HashMap<AcceptanceHash, QuoteId>,
    activities: Vec<Activity>,
    audit_log: Vec<AuditLogEntry>,
}

impl Tables {
    fn lead(&self, id: &LeadId) -> StorageResult<&Lead> {
        self.leads
            .get(id)
            .ok_or_else(|| StorageError::NotFound(format!("lead {}", id)))
    }

    fn quotes_for_lead(&self, lead_id: &LeadId) -> Vec<QuoteVersion> {
        let mut quotes = self
            .quotes
            .values()
            .filter(|quote| &quote.lead_id == lead_id)
            .cloned()
            .collect::<Vec<_>>();
        quotes.sort_by_key(|quote| quote.version);
        quotes
    }
}

/// In-memory storage for development and testing
#[derive(Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
    }
}

fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl LeadStore for InMemoryStorage {
    async fn create_lead(&self, lead: Lead, context: &AuditContext) -> StorageResult<Lead> {
        let mut tables = self.write()?;
        if tables.leads.contains_key(&lead.id) {
            return Err(StorageError::Conflict(format!(
                "lead {} already exists",
                lead.id
            )));
        }

        let plan = plan_intake(&lead, context);
        tables.leads.insert(lead.id, lead.clone());
        tables.activities.push(plan.activity);
        tables.audit_log.push(plan.audit);
        Ok(lead)
    }

    async fn get_lead(&self, id: &LeadId) -> StorageResult<Option<Lead>> {
        Ok(self.read()?.leads.get(id).cloned())
    }

    async fn list_leads(&self, filter: LeadFilter) -> StorageResult<Vec<Lead>> {
        let tables = self.read()?;
        let mut leads = tables
            .leads
            .values()
            .filter(|lead| filter.status.map_or(true, |status| lead.status == status))
            .cloned()
            .collect::<Vec<_>>();
        newest_first(&mut leads, |lead| lead.created_at);
        Ok(filter.window.apply(leads))
    }

    async fn transition_lead(
        &self,
        id: &LeadId,
        to: LeadStatus,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> StorageResult<LeadTransition> {
        let mut tables = self.write()?;
        let plan = plan_transition(tables.lead(id)?, to, context, now)?;

        tables.leads.insert(plan.lead.id, plan.lead.clone());
        tables.activities.push(plan.activity);
        tables.audit_log.push(plan.audit);

        Ok(LeadTransition {
            lead: plan.lead,
            from: plan.from,
        })
    }
}

#[async_trait]
impl QuoteStore for InMemoryStorage {
    async fn create_quote_version(
        &self,
        input: NewQuoteVersion,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> StorageResult<CreatedQuote> {
        let mut tables = self.write()?;
        let lead_id = input.lead_id;
        let existing = tables.quotes_for_lead(&lead_id);
        let plan = plan_quote(tables.lead(&lead_id)?, &existing, input, context, now)?;

        let superseded = plan.superseded.iter().map(|q| q.id).collect::<Vec<_>>();
        for retired in plan.superseded {
            tables.quotes.insert(retired.id, retired);
        }
        tables
            .quotes_by_hash
            .insert(plan.quote.acceptance_hash.clone(), plan.quote.id);
        tables.quotes.insert(plan.quote.id, plan.quote.clone());
        tables.leads.insert(plan.lead.id, plan.lead.clone());
        tables.activities.push(plan.activity);
        tables.audit_log.extend(plan.audits);

        Ok(CreatedQuote {
            quote: plan.quote,
            lead: plan.lead,
            superseded,
            promoted_from: plan.promoted_from,
        })
    }

    async fn get_quote(&self, id: &QuoteId) -> StorageResult<Option<QuoteVersion>> {
        Ok(self.read()?.quotes.get(id).cloned())
    }

    async fn get_quote_by_hash(
        &self,
        hash: &AcceptanceHash,
    ) -> StorageResult<Option<QuoteVersion>> {
        let tables = self.read()?;
        Ok(tables
            .quotes_by_hash
            .get(hash)
            .and_then(|id| tables.quotes.get(id))
            .cloned())
    }

    async fn list_quotes_for_lead(&self, lead_id: &LeadId) -> StorageResult<Vec<QuoteVersion>> {
        Ok(self.read()?.quotes_for_lead(lead_id))
    }

    async fn list_quotes(&self, window: QueryWindow) -> StorageResult<Vec<QuoteVersion>> {
        let tables = self.read()?;
        let mut quotes = tables.quotes.values().cloned().collect::<Vec<_>>();
        newest_first(&mut quotes, |quote| quote.created_at);
        Ok(window.apply(quotes))
    }
}

#[async_trait]
impl AcceptanceStore for InMemoryStorage {
    async fn accept_quote(&self, command: AcceptQuote) -> StorageResult<AcceptedQuote> {
        let mut tables = self.write()?;
        let quote = tables
            .quotes
            .get(&command.quote_id)
            .ok_or_else(|| StorageError::NotFound(format!("quote {}", command.quote_id)))?;
        let plan = plan_acceptance(quote, tables.lead(&quote.lead_id)?, &command)?;

        tables.quotes.insert(plan.quote.id, plan.quote.clone());
        tables.leads.insert(plan.lead.id, plan.lead.clone());
        tables.activities.push(plan.activity);
        tables.audit_log.push(plan.quote_audit);
        tables.audit_log.push(plan.lead_audit);

        Ok(AcceptedQuote {
            quote: plan.quote,
            lead: plan.lead,
            previous_lead_status: plan.previous_lead_status,
        })
    }
}

#[async_trait]
impl ActivityStore for InMemoryStorage {
    async fn append_activity(&self, activity: Activity) -> StorageResult<Activity> {
        let mut tables = self.write()?;
        tables.lead(&activity.lead_id)?;
        tables.activities.push(activity.clone());
        Ok(activity)
    }

    async fn list_activities(
        &self,
        lead_id: &LeadId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Activity>> {
        let tables = self.read()?;
        // insertion order breaks ties between entries sharing a timestamp
        let activities = tables
            .activities
            .iter()
            .rev()
            .filter(|activity| &activity.lead_id == lead_id)
            .cloned();
        let mut activities = activities.collect::<Vec<_>>();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(window.apply(activities))
    }
}

#[async_trait]
impl AuditStore for InMemoryStorage {
    async fn list_audit(&self, filter: AuditFilter) -> StorageResult<Vec<AuditLogEntry>> {
        let tables = self.read()?;
        let mut entries = tables
            .audit_log
            .iter()
            .rev()
            .filter(|entry| {
                filter
                    .entity_type
                    .map_or(true, |entity_type| entry.entity_type == entity_type)
            })
            .filter(|entry| {
                filter
                    .entity_id
                    .as_deref()
                    .map_or(true, |entity_id| entry.entity_id == entity_id)
            })
            .cloned()
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(filter.window.apply(entries))
    }
}

impl LeadDeskStorage for InMemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
