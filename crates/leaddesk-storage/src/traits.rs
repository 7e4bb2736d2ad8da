use crate::model::{
    AcceptQuote, AcceptedQuote, AuditFilter, CreatedQuote, LeadFilter, LeadTransition,
    NewQuoteVersion, QueryWindow,
};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leaddesk_types::{
    AcceptanceHash, Activity, AuditContext, AuditLogEntry, Lead, LeadId, LeadStatus, QuoteId,
    QuoteVersion,
};

/// Storage interface for leads and their pipeline position.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a new lead together with its intake activity and audit entry.
    async fn create_lead(&self, lead: Lead, context: &AuditContext) -> StorageResult<Lead>;

    async fn get_lead(&self, id: &LeadId) -> StorageResult<Option<Lead>>;

    async fn list_leads(&self, filter: LeadFilter) -> StorageResult<Vec<Lead>>;

    /// Move a lead to another status, writing activity and audit atomically.
    ///
    /// Same-status moves fail with `InvalidInput`; moves out of a terminal
    /// status fail with `Conflict`.
    async fn transition_lead(
        &self,
        id: &LeadId,
        to: LeadStatus,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> StorageResult<LeadTransition>;
}

/// Storage interface for quote versions.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Issue the next version for a lead, superseding open earlier versions.
    async fn create_quote_version(
        &self,
        input: NewQuoteVersion,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> StorageResult<CreatedQuote>;

    async fn get_quote(&self, id: &QuoteId) -> StorageResult<Option<QuoteVersion>>;

    async fn get_quote_by_hash(&self, hash: &AcceptanceHash)
        -> StorageResult<Option<QuoteVersion>>;

    /// Versions of one lead, ascending by version number.
    async fn list_quotes_for_lead(&self, lead_id: &LeadId) -> StorageResult<Vec<QuoteVersion>>;

    /// All versions, newest first.
    async fn list_quotes(&self, window: QueryWindow) -> StorageResult<Vec<QuoteVersion>>;
}

/// Storage interface for the client acceptance transaction.
#[async_trait]
pub trait AcceptanceStore: Send + Sync {
    /// Mark a quote accepted, move its lead to `order`, append one activity and
    /// two audit entries, all or nothing.
    ///
    /// Fails with `Conflict` when the quote is already accepted and `Expired`
    /// when its link has lapsed at `accepted_at`.
    async fn accept_quote(&self, command: AcceptQuote) -> StorageResult<AcceptedQuote>;
}

/// Storage interface for lead timelines.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append_activity(&self, activity: Activity) -> StorageResult<Activity>;

    /// Read a lead's activities newest-first.
    async fn list_activities(
        &self,
        lead_id: &LeadId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Activity>>;
}

/// Read access to the append-only audit log. Entries are only ever written as
/// part of the mutations above.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn list_audit(&self, filter: AuditFilter) -> StorageResult<Vec<AuditLogEntry>>;
}

/// Unified storage bundle used by the service.
pub trait LeadDeskStorage:
    LeadStore + QuoteStore + AcceptanceStore + ActivityStore + AuditStore + Send + Sync
{
    /// Short backend name for health reporting.
    fn backend_name(&self) -> &'static str;
}
