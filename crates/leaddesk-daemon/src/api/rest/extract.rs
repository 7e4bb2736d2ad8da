//! Request extractors shared by the handlers

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::validation::parse_json;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use leaddesk_storage::QueryWindow;
use leaddesk_types::{LeadId, QuoteId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;

/// A body that parsed as JSON but has not been decoded or validated yet.
///
/// Unlike `axum::Json`, this does not require a `Content-Type` header and
/// reports unparseable bodies in the API's own error format.
#[derive(Debug)]
pub struct RawJson(pub Value);

#[async_trait]
impl<S> FromRequest<S> for RawJson
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        // Oversized bodies keep axum's 413 rejection.
        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(IntoResponse::into_response)?;
        parse_json(&bytes)
            .map(RawJson)
            .map_err(IntoResponse::into_response)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::from_parts(&parts.headers, &parts.extensions))
    }
}

/// Query string parameters, rejected as `{error, code}` like body errors
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
    }
}

/// Paging parameters accepted by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

impl PageQuery {
    pub fn window(&self) -> QueryWindow {
        page_window(self.limit, self.offset)
    }
}

/// Bounded window for list endpoints; callers never get an unlimited read
pub fn page_window(limit: Option<usize>, offset: Option<usize>) -> QueryWindow {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    QueryWindow::new(limit, offset.unwrap_or(0))
}

pub fn parse_lead_id(raw: &str) -> ApiResult<LeadId> {
    raw.parse()
        .map_err(|e: leaddesk_types::ParseIdError| ApiError::BadRequest(e.to_string()))
}

pub fn parse_quote_id(raw: &str) -> ApiResult<QuoteId> {
    raw.parse()
        .map_err(|e: leaddesk_types::ParseIdError| ApiError::BadRequest(e.to_string()))
}
