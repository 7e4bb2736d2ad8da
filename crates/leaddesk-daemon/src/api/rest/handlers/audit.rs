//! Audit trail handler

use crate::api::rest::extract::{page_window, ApiQuery};
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use leaddesk_storage::AuditFilter;
use leaddesk_types::{AuditEntityType, AuditLogEntry};
use serde::Deserialize;

/// Query parameters for the audit trail
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Read the audit trail, newest first
pub async fn list_audit(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> ApiResult<Json<Vec<AuditLogEntry>>> {
    let entity_type = query
        .entity_type
        .as_deref()
        .map(|raw| {
            AuditEntityType::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown entity type '{}'", raw)))
        })
        .transpose()?;

    let entries = state
        .storage
        .list_audit(AuditFilter {
            entity_type,
            entity_id: query.entity_id,
            window: page_window(query.limit, query.offset),
        })
        .await?;
    Ok(Json(entries))
}
