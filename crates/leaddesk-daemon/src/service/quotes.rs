//! Issuing quote versions

use crate::api::rest::state::AppState;
use crate::config::QuoteConfig;
use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::validation::{require_text, Validate};
use chrono::{DateTime, Duration, Utc};
use leaddesk_storage::NewQuoteVersion;
use leaddesk_types::{LeadDeskEvent, LeadId, LeadStatus, LineItem, QuoteId, QuoteVersion};
use serde::{Deserialize, Serialize};

pub const MAX_LINE_ITEMS: usize = 100;
pub const MAX_VALIDITY_DAYS: u32 = 365;

/// Body of `POST /leads/:id/quotes`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuoteRequest {
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub validity_days: Option<u32>,
}

impl Validate for CreateQuoteRequest {
    fn validate(&self) -> Result<(), String> {
        if self.line_items.is_empty() {
            return Err("at least one line item is required".to_string());
        }
        if self.line_items.len() > MAX_LINE_ITEMS {
            return Err(format!("at most {} line items are allowed", MAX_LINE_ITEMS));
        }
        for (index, item) in self.line_items.iter().enumerate() {
            require_text(
                &format!("line_items[{}].description", index),
                &item.description,
                500,
            )?;
            if item.quantity == 0 {
                return Err(format!("line_items[{}].quantity must be at least 1", index));
            }
            if item.unit_price_minor < 0 {
                return Err(format!(
                    "line_items[{}].unit_price_minor must not be negative",
                    index
                ));
            }
        }
        if LineItem::sum(&self.line_items).is_none() {
            return Err("quote total is too large".to_string());
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Err("currency must be a three-letter ISO code".to_string());
            }
        }
        if let Some(days) = self.validity_days {
            if days == 0 || days > MAX_VALIDITY_DAYS {
                return Err(format!(
                    "validity_days must be between 1 and {}",
                    MAX_VALIDITY_DAYS
                ));
            }
        }
        Ok(())
    }
}

impl CreateQuoteRequest {
    pub fn into_new_version(
        self,
        lead_id: LeadId,
        defaults: &QuoteConfig,
        now: DateTime<Utc>,
    ) -> NewQuoteVersion {
        let days = self.validity_days.unwrap_or(defaults.default_validity_days);
        let currency = self
            .currency
            .unwrap_or_else(|| defaults.default_currency.clone())
            .to_ascii_uppercase();
        let line_items = self
            .line_items
            .into_iter()
            .map(|item| LineItem {
                description: item.description.trim().to_string(),
                ..item
            })
            .collect();

        NewQuoteVersion {
            lead_id,
            line_items,
            currency,
            hash_expires_at: now + Duration::days(i64::from(days)),
        }
    }
}

/// Staff-facing result of issuing a version
#[derive(Debug, Clone, Serialize)]
pub struct IssuedQuote {
    pub quote: QuoteVersion,
    /// Path the client opens to review and accept
    pub acceptance_path: String,
    pub superseded: Vec<QuoteId>,
    pub lead_status: LeadStatus,
}

pub fn acceptance_path(quote: &QuoteVersion) -> String {
    format!("/api/v1/public/quotes/{}", quote.acceptance_hash)
}

pub async fn create_quote(
    state: &AppState,
    lead_id: &LeadId,
    request: CreateQuoteRequest,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> ApiResult<IssuedQuote> {
    let input = request.into_new_version(*lead_id, &state.quotes, now);
    let created = state
        .storage
        .create_quote_version(input, &context.audit_context(), now)
        .await?;
    let quote = created.quote;

    tracing::info!(
        lead_id = %lead_id,
        quote_id = %quote.id,
        version = quote.version,
        total = %quote.display_total(),
        superseded = created.superseded.len(),
        "Quote version issued"
    );

    if let Some(from) = created.promoted_from {
        state.publish(
            LeadDeskEvent::LeadStatusChanged {
                lead_id: *lead_id,
                from,
                to: created.lead.status,
            },
            &context.actor,
        );
    }
    state.publish(
        LeadDeskEvent::QuoteCreated {
            lead_id: *lead_id,
            quote_id: quote.id,
            version: quote.version,
        },
        &context.actor,
    );

    Ok(IssuedQuote {
        acceptance_path: acceptance_path(&quote),
        quote,
        superseded: created.superseded,
        lead_status: created.lead.status,
    })
}

/// Load one version, reporting a lapsed link as `expired`
pub async fn get_quote(
    state: &AppState,
    id: &QuoteId,
    now: DateTime<Utc>,
) -> ApiResult<QuoteVersion> {
    state
        .storage
        .get_quote(id)
        .await?
        .map(|quote| quote.as_seen_at(now))
        .ok_or_else(|| ApiError::NotFound(format!("Quote {} not found", id)))
}

pub async fn list_for_lead(
    state: &AppState,
    lead_id: &LeadId,
    now: DateTime<Utc>,
) -> ApiResult<Vec<QuoteVersion>> {
    if state.storage.get_lead(lead_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Lead {} not found", lead_id)));
    }
    let versions = state.storage.list_quotes_for_lead(lead_id).await?;
    Ok(versions
        .into_iter()
        .map(|quote| quote.as_seen_at(now))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::decode;
    use serde_json::json;

    fn message(body: serde_json::Value) -> String {
        match decode::<CreateQuoteRequest>(body) {
            Err(ApiError::Validation(message)) => message,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    fn item(quantity: u32, unit_price_minor: i64) -> serde_json::Value {
        json!({ "description": "Site visit", "quantity": quantity, "unit_price_minor": unit_price_minor })
    }

    #[test]
    fn rejects_bad_line_items() {
        assert_eq!(
            message(json!({ "line_items": [] })),
            "at least one line item is required"
        );
        assert_eq!(
            message(json!({ "line_items": [item(0, 100)] })),
            "line_items[0].quantity must be at least 1"
        );
        assert_eq!(
            message(json!({ "line_items": [item(1, 100), item(1, -5)] })),
            "line_items[1].unit_price_minor must not be negative"
        );
        assert_eq!(
            message(json!({ "line_items": [item(2, i64::MAX)] })),
            "quote total is too large"
        );
    }

    #[test]
    fn rejects_bad_currency_and_validity() {
        assert_eq!(
            message(json!({ "line_items": [item(1, 100)], "currency": "EURO" })),
            "currency must be a three-letter ISO code"
        );
        assert_eq!(
            message(json!({ "line_items": [item(1, 100)], "validity_days": 0 })),
            "validity_days must be between 1 and 365"
        );
    }

    #[test]
    fn applies_configured_defaults() {
        let request: CreateQuoteRequest =
            decode(json!({ "line_items": [item(2, 12_500)] })).unwrap();
        let now = Utc::now();
        let input = request.into_new_version(LeadId::generate(), &QuoteConfig::default(), now);
        assert_eq!(input.currency, "EUR");
        assert_eq!(input.hash_expires_at, now + Duration::days(30));

        let request: CreateQuoteRequest = decode(json!({
            "line_items": [item(1, 100)],
            "currency": "chf",
            "validity_days": 7
        }))
        .unwrap();
        let input = request.into_new_version(LeadId::generate(), &QuoteConfig::default(), now);
        assert_eq!(input.currency, "CHF");
        assert_eq!(input.hash_expires_at, now + Duration::days(7));
    }
}
