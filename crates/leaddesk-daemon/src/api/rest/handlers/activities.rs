//! Lead timeline handlers

use crate::api::rest::extract::{parse_lead_id, ApiQuery, PageQuery, RawJson};
use crate::api::rest::state::AppState;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::service::leads::{self, AddNoteRequest};
use crate::validation::decode;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use leaddesk_types::Activity;

/// List a lead's activities, newest first
pub async fn list_activities(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> ApiResult<Json<Vec<Activity>>> {
    let id = parse_lead_id(&id)?;
    Ok(Json(leads::list_activities(&state, &id, page.window()).await?))
}

/// Add a free-text note to a lead
pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    context: RequestContext,
    RawJson(body): RawJson,
) -> ApiResult<(StatusCode, Json<Activity>)> {
    let id = parse_lead_id(&id)?;
    let request: AddNoteRequest = decode(body)?;
    let activity = leads::add_note(&state, &id, request, &context, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}
