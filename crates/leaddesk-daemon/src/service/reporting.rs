//! Admin pipeline reporting

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use chrono::{DateTime, Utc};
use leaddesk_storage::{LeadFilter, QueryWindow};
use leaddesk_types::{format_minor, Lead, LeadStatus, QuoteStatus, QuoteVersion};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: LeadStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedValue {
    pub currency: String,
    pub total_minor: i64,
    pub total: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub total_leads: usize,
    pub leads_by_status: Vec<StatusCount>,
    pub quotes_issued: usize,
    pub quotes_accepted: usize,
    pub accepted_value: Vec<AcceptedValue>,
    /// Leads won as a share of leads that received a quote
    pub conversion_rate: f64,
}

pub async fn pipeline_report(state: &AppState, now: DateTime<Utc>) -> ApiResult<PipelineReport> {
    let leads = state.storage.list_leads(LeadFilter::default()).await?;
    let quotes = state.storage.list_quotes(QueryWindow::default()).await?;
    Ok(summarize(&leads, &quotes, now))
}

pub fn summarize(leads: &[Lead], quotes: &[QuoteVersion], now: DateTime<Utc>) -> PipelineReport {
    let leads_by_status = LeadStatus::PIPELINE
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: leads.iter().filter(|lead| lead.status == *status).count(),
        })
        .collect();

    let accepted: Vec<&QuoteVersion> = quotes
        .iter()
        .filter(|quote| quote.status == QuoteStatus::Accepted)
        .collect();

    let mut per_currency: BTreeMap<&str, i64> = BTreeMap::new();
    for quote in &accepted {
        let total = per_currency.entry(quote.currency.as_str()).or_insert(0);
        *total = total.saturating_add(quote.total_minor);
    }
    let accepted_value = per_currency
        .into_iter()
        .map(|(currency, total_minor)| AcceptedValue {
            currency: currency.to_string(),
            total_minor,
            total: format_minor(total_minor, currency),
        })
        .collect();

    let quoted_leads = leads.iter().filter(|lead| lead.status.reached_quote()).count();
    let won_leads: HashSet<_> = accepted.iter().map(|quote| quote.lead_id).collect();
    let conversion_rate = if quoted_leads == 0 {
        0.0
    } else {
        won_leads.len() as f64 / quoted_leads as f64
    };

    PipelineReport {
        generated_at: now,
        total_leads: leads.len(),
        leads_by_status,
        quotes_issued: quotes.len(),
        quotes_accepted: accepted.len(),
        accepted_value,
        conversion_rate,
    }
}
