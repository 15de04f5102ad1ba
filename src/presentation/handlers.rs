// HTTP request handlers
use crate::application::error::RequestError;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ComparisonQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub mode: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn respond<T: Serialize>(status: StatusCode, data: &T, compress: bool) -> Response {
    match json_response(status, data, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn error_response(err: RequestError, compress: bool) -> Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    let body = ErrorBody {
        error: err.to_string(),
    };
    respond(status, &body, compress).await
}

fn parse_date(value: &str) -> Result<NaiveDate, RequestError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| RequestError::InvalidDate(value.to_string()))
}

/// Read the `start`/`end` query dates. A missing `end` selects the single
/// day `start`.
fn requested_dates(query: &ComparisonQuery) -> Result<(NaiveDate, NaiveDate), RequestError> {
    let start = query
        .start
        .as_deref()
        .ok_or(RequestError::MissingParameter("start"))
        .and_then(parse_date)?;
    let end = match query.end.as_deref() {
        Some(end) => parse_date(end)?,
        None => start,
    };
    Ok((start, end))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List all configured monitoring sites
pub async fn list_sites(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let compress = accepts_brotli(&headers);
    respond(StatusCode::OK, &state.site_service.list_sites(), compress).await
}

/// Align a site's primary, reference and rainfall streams over a date range
pub async fn site_comparison(
    Path(id): Path<String>,
    Query(query): Query<ComparisonQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = accepts_brotli(&headers);

    let site = match state.site_service.find_site(&id) {
        Ok(site) => site,
        Err(e) => return error_response(e, compress).await,
    };

    let range = match requested_dates(&query)
        .and_then(|(start, end)| state.comparison_service.resolve_range(start, end))
    {
        Ok(range) => range,
        Err(e) => return error_response(e, compress).await,
    };

    match state
        .comparison_service
        .compare(site, range, query.mode.as_deref())
        .await
    {
        Ok(report) => respond(StatusCode::OK, &report, compress).await,
        Err(e) => error_response(e, compress).await,
    }
}
