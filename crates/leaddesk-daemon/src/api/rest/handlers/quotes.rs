//! Staff-facing quote handlers

use crate::api::rest::extract::{parse_lead_id, parse_quote_id, RawJson};
use crate::api::rest::state::AppState;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::service::quotes::{self, CreateQuoteRequest, IssuedQuote};
use crate::validation::decode;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use leaddesk_types::QuoteVersion;

/// Issue the next quote version for a lead
pub async fn create_quote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    context: RequestContext,
    RawJson(body): RawJson,
) -> ApiResult<(StatusCode, Json<IssuedQuote>)> {
    let lead_id = parse_lead_id(&id)?;
    let request: CreateQuoteRequest = decode(body)?;
    let issued = quotes::create_quote(&state, &lead_id, request, &context, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// All versions of a lead's quote, oldest first
pub async fn list_lead_quotes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<QuoteVersion>>> {
    let lead_id = parse_lead_id(&id)?;
    Ok(Json(quotes::list_for_lead(&state, &lead_id, Utc::now()).await?))
}

/// Get a specific quote version
pub async fn get_quote(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<QuoteVersion>> {
    let quote_id = parse_quote_id(&id)?;
    Ok(Json(quotes::get_quote(&state, &quote_id, Utc::now()).await?))
}
