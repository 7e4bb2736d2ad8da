//! Admin reporting handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::service::reporting::{self, PipelineReport};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn pipeline_report(State(state): State<AppState>) -> ApiResult<Json<PipelineReport>> {
    Ok(Json(reporting::pipeline_report(&state, Utc::now()).await?))
}
