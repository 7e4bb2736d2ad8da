//! Unauthenticated client endpoints reached through an acceptance link

use crate::api::rest::extract::RawJson;
use crate::api::rest::state::AppState;
use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::service::acceptance::{self, AcceptanceReceipt, PublicQuoteView};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

/// Show a quote to the client
pub async fn view_public_quote(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<PublicQuoteView>> {
    Ok(Json(acceptance::public_view(&state, &hash, Utc::now()).await?))
}

/// Record the client's acceptance
pub async fn accept_public_quote(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    context: RequestContext,
    RawJson(body): RawJson,
) -> ApiResult<Json<AcceptanceReceipt>> {
    let receipt = acceptance::accept_quote(&state, &hash, body, &context, Utc::now()).await?;
    Ok(Json(receipt))
}
