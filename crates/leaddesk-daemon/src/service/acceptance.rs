//! Client acceptance of a quote through its public link

use crate::api::rest::state::AppState;
use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::validation::{decode, limit_text, Validate};
use chrono::{DateTime, Utc};
use leaddesk_storage::{AcceptQuote, LeadDeskStorage};
use leaddesk_types::{
    AcceptanceCheck, AcceptanceHash, Lead, LeadDeskEvent, LeadId, LineItem, QuoteId,
    QuoteStatus, QuoteVersion,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_NOTE_CHARS: usize = 1000;

const HASH_LEN: usize = 64;

/// Body of `POST /public/quotes/:hash/accept`
#[derive(Debug, Clone, Deserialize)]
pub struct AcceptanceRequest {
    #[serde(default, alias = "termsAccepted")]
    pub terms_accepted: bool,

    #[serde(default)]
    pub note: Option<String>,
}

impl Validate for AcceptanceRequest {
    fn validate(&self) -> Result<(), String> {
        if !self.terms_accepted {
            return Err("terms must be accepted".to_string());
        }
        if let Some(note) = &self.note {
            limit_text("note", note, MAX_NOTE_CHARS)?;
        }
        Ok(())
    }
}

/// Returned to the client after a committed acceptance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceReceipt {
    pub quote_id: QuoteId,
    pub lead_id: LeadId,
    pub accepted_at: DateTime<Utc>,
}

/// What the client sees behind the acceptance link
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuoteView {
    pub quote_id: QuoteId,
    pub version: u32,
    pub reference: String,
    pub project_title: String,
    pub client_name: String,
    pub line_items: Vec<LineItem>,
    pub total_minor: i64,
    pub total: String,
    pub currency: String,
    pub status: QuoteStatus,
    pub expires_at: DateTime<Utc>,
    pub acceptable: bool,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Find the quote behind an acceptance link
pub async fn resolve_quote(storage: &dyn LeadDeskStorage, hash: &str) -> ApiResult<QuoteVersion> {
    let well_formed = hash.len() == HASH_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit());
    if !well_formed {
        return Err(not_found());
    }
    storage
        .get_quote_by_hash(&AcceptanceHash::new(hash.to_ascii_lowercase()))
        .await?
        .ok_or_else(not_found)
}

fn not_found() -> ApiError {
    ApiError::NotFound("quote not found".to_string())
}

async fn quote_lead(storage: &dyn LeadDeskStorage, quote: &QuoteVersion) -> ApiResult<Lead> {
    storage
        .get_lead(&quote.lead_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("quote {} has no lead", quote.id)))
}

pub async fn public_view(
    state: &AppState,
    hash: &str,
    now: DateTime<Utc>,
) -> ApiResult<PublicQuoteView> {
    let quote = resolve_quote(state.storage.as_ref(), hash).await?;
    let lead = quote_lead(state.storage.as_ref(), &quote).await?;
    let acceptable = quote.is_acceptable_at(now) && !lead.status.is_terminal();

    Ok(PublicQuoteView {
        quote_id: quote.id,
        version: quote.version,
        reference: lead.reference,
        project_title: lead.project.title,
        client_name: lead.client.name,
        total: quote.display_total(),
        acceptable,
        status: quote.effective_status(now),
        line_items: quote.line_items,
        total_minor: quote.total_minor,
        currency: quote.currency,
        expires_at: quote.hash_expires_at,
        accepted_at: quote.accepted_at,
    })
}

/// Accept a quote on behalf of the client holding its link.
///
/// Checks run in order: link lookup, link state, lead state, body validation.
/// The storage transaction re-checks both states so a concurrent winner or a
/// concurrent close yields `Conflict`.
pub async fn accept_quote(
    state: &AppState,
    hash: &str,
    body: Value,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> ApiResult<AcceptanceReceipt> {
    let quote = resolve_quote(state.storage.as_ref(), hash).await?;

    match quote.acceptance_check(now) {
        AcceptanceCheck::Open => {}
        AcceptanceCheck::AlreadyAccepted => {
            return Err(ApiError::Conflict("quote has already been accepted".to_string()))
        }
        AcceptanceCheck::Expired => {
            return Err(ApiError::Gone("acceptance link has expired".to_string()))
        }
    }
    let lead = quote_lead(state.storage.as_ref(), &quote).await?;
    if lead.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "lead is closed as {}; the quote can no longer be accepted",
            lead.status
        )));
    }

    let request: AcceptanceRequest = decode(body)?;

    let accepted = state
        .storage
        .accept_quote(AcceptQuote {
            quote_id: quote.id,
            accepted_at: now,
            ip: context.ip.clone(),
            user_agent: context.user_agent.clone(),
            note: normalize_note(request.note),
            terms_accepted: request.terms_accepted,
        })
        .await?;

    let lead = &accepted.lead;
    let actor = format!("client:{}", lead.client.email);
    tracing::info!(
        quote_id = %accepted.quote.id,
        lead_id = %lead.id,
        version = accepted.quote.version,
        ip = context.ip.as_deref().unwrap_or("-"),
        "Quote accepted"
    );

    if accepted.previous_lead_status != lead.status {
        state.publish(
            LeadDeskEvent::LeadStatusChanged {
                lead_id: lead.id,
                from: accepted.previous_lead_status,
                to: lead.status,
            },
            &actor,
        );
    }
    state.publish(
        LeadDeskEvent::QuoteAccepted {
            lead_id: lead.id,
            quote_id: accepted.quote.id,
            accepted_at: now,
            client_email: accepted.quote.accepted_by_email.clone(),
        },
        &actor,
    );

    Ok(AcceptanceReceipt {
        quote_id: accepted.quote.id,
        lead_id: lead.id,
        accepted_at: now,
    })
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
}
