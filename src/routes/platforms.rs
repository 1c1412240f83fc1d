//! Platform directory endpoints
//!
//! - GET /api/platforms[?status=..][&test=true] - listing rows
//! - GET /api/platforms/count - collection size
//! - GET /api/platforms/{slug} - one platform without its heavy fields

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::schemas::PlatformSummary;
use crate::routes::{error_response, json_response};
use crate::server::AppState;
use crate::services::{ListFilter, StatusFilter};
use crate::types::ChastorError;

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
    test: Option<String>,
}

impl ListQuery {
    /// An explicit status wins over `test`, which shows every platform
    fn into_filter(self) -> ListFilter {
        let status = self.status.as_deref().and_then(StatusFilter::parse);
        let test = matches!(self.test.as_deref(), Some("true" | "1"));

        match status {
            Some(status) => ListFilter {
                status: Some(status),
            },
            None if test => ListFilter::all(),
            None => ListFilter::default(),
        }
    }
}

fn parse_filter(query: Option<&str>) -> Result<ListFilter, ChastorError> {
    let query: ListQuery = match query {
        Some(raw) => serde_urlencoded::from_str(raw)
            .map_err(|e| ChastorError::BadRequest(format!("Invalid query: {e}")))?,
        None => ListQuery::default(),
    };
    Ok(query.into_filter())
}

#[derive(Serialize)]
struct ListResponse {
    platforms: Vec<PlatformSummary>,
    count: usize,
}

pub async fn handle_list(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    let filter = match parse_filter(query) {
        Ok(filter) => filter,
        Err(e) => return error_response(&e),
    };

    match state.platforms.list_summaries(&filter).await {
        Ok(platforms) => {
            debug!(count = platforms.len(), ?filter, "Listed platforms");
            json_response(
                StatusCode::OK,
                &ListResponse {
                    count: platforms.len(),
                    platforms,
                },
            )
        }
        Err(e) => error_response(&e),
    }
}

pub async fn handle_count(state: &AppState) -> Response<Full<Bytes>> {
    match state.platforms.count().await {
        Ok(count) => json_response(StatusCode::OK, &serde_json::json!({ "count": count })),
        Err(e) => error_response(&e),
    }
}

pub async fn handle_get(state: &AppState, slug: &str) -> Response<Full<Bytes>> {
    match state.platforms.get_by_slug(slug).await {
        Ok(Some(platform)) => json_response(StatusCode::OK, &platform),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "Not Found", "slug": slug }),
        ),
        Err(e) => error_response(&e),
    }
}
