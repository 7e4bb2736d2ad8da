//! Lead intake and pipeline handlers

use crate::api::rest::extract::{page_window, parse_lead_id, ApiQuery, RawJson};
use crate::api::rest::state::AppState;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::service::leads::{self, BoardColumn, CreateLeadRequest, MoveLeadRequest};
use crate::validation::decode;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use leaddesk_storage::LeadTransition;
use leaddesk_types::Lead;
use serde::Deserialize;

/// Query parameters for lead listings
#[derive(Debug, Default, Deserialize)]
pub struct ListLeadsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// List leads, newest first
pub async fn list_leads(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListLeadsQuery>,
) -> ApiResult<Json<Vec<Lead>>> {
    let window = page_window(query.limit, query.offset);
    let found = leads::list_leads(&state, query.status.as_deref(), window).await?;
    Ok(Json(found))
}

/// Capture a new lead
pub async fn create_lead(
    State(state): State<AppState>,
    context: RequestContext,
    RawJson(body): RawJson,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    let request: CreateLeadRequest = decode(body)?;
    let lead = leads::create_lead(&state, request, &context, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

/// Get a specific lead
pub async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Lead>> {
    let id = parse_lead_id(&id)?;
    Ok(Json(leads::get_lead(&state, &id).await?))
}

/// Move a lead to another pipeline column
pub async fn move_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
    context: RequestContext,
    RawJson(body): RawJson,
) -> ApiResult<Json<LeadTransition>> {
    let id = parse_lead_id(&id)?;
    let request: MoveLeadRequest = decode(body)?;
    let transition = leads::move_lead(&state, &id, request, &context, Utc::now()).await?;
    Ok(Json(transition))
}

/// Kanban board
pub async fn pipeline_board(State(state): State<AppState>) -> ApiResult<Json<Vec<BoardColumn>>> {
    Ok(Json(leads::board(&state).await?))
}
