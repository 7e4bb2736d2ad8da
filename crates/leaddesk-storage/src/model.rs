use chrono::{DateTime, Utc};
use leaddesk_types::{
    AuditEntityType, Lead, LeadId, LeadStatus, LineItem, QuoteId, QuoteVersion,
};
use serde::{Deserialize, Serialize};

/// Generic query window for paged reads. A zero limit means "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Apply the window to an already ordered sequence
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}

/// Filter for lead listings (newest first)
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub window: QueryWindow,
}

/// Filter for audit trail reads (newest first)
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<AuditEntityType>,
    pub entity_id: Option<String>,
    pub window: QueryWindow,
}

/// Result of moving a lead between pipeline columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadTransition {
    pub lead: Lead,
    pub from: LeadStatus,
}

/// Input for issuing the next quote version of a lead.
/// Version number and acceptance hash are assigned by storage.
#[derive(Debug, Clone)]
pub struct NewQuoteVersion {
    pub lead_id: LeadId,
    pub line_items: Vec<LineItem>,
    pub currency: String,
    pub hash_expires_at: DateTime<Utc>,
}

/// Outcome of issuing a quote version
#[derive(Debug, Clone)]
pub struct CreatedQuote {
    pub quote: QuoteVersion,
    pub lead: Lead,
    /// Earlier versions retired by this one
    pub superseded: Vec<QuoteId>,
    /// Previous lead status when the lead was promoted to `quoted`
    pub promoted_from: Option<LeadStatus>,
}

/// Acceptance command executed in one transaction
#[derive(Debug, Clone)]
pub struct AcceptQuote {
    pub quote_id: QuoteId,
    pub accepted_at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub note: Option<String>,
    pub terms_accepted: bool,
}

/// Outcome of a committed acceptance
#[derive(Debug, Clone)]
pub struct AcceptedQuote {
    pub quote: QuoteVersion,
    pub lead: Lead,
    pub previous_lead_status: LeadStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_applies_offset_and_limit() {
        let items = (0..10).collect::<Vec<_>>();
        assert_eq!(QueryWindow::new(3, 2).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(QueryWindow::new(0, 8).apply(items), vec![8, 9]);
    }
}
