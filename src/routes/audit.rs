//! Data-quality audit report (/api/audit)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::routes::json_response;
use crate::server::AppState;
use crate::services::AuditStats;

#[derive(Serialize)]
struct AuditEnvelope<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a AuditStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    timestamp: String,
}

pub async fn handle_audit(state: &AppState) -> Response<Full<Bytes>> {
    let timestamp = chrono::Utc::now().to_rfc3339();

    let stats = match state.audit.compute_stats().await {
        Ok(stats) => stats,
        Err(_) => {
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &AuditEnvelope {
                    status: "error",
                    data: None,
                    message: Some("Failed to generate audit report"),
                    timestamp,
                },
            );
        }
    };

    if stats.has_critical_issues() {
        warn!(
            missing_slugs = stats.slug_analysis.missing,
            missing_domains = stats.domain_analysis.missing,
            "Platforms missing required keys"
        );
    }
    if stats.has_duplicates() {
        warn!(
            slug_documents = stats.slug_analysis.duplicated_documents(),
            domain_documents = stats.domain_analysis.duplicated_documents(),
            "Duplicate platform keys"
        );
    }
    info!(
        mobile_apps = %format!("{}%", stats.mobile_app_coverage()),
        social_profiles = %format!("{}%", stats.social_profile_coverage()),
        "Enrichment coverage"
    );

    json_response(
        StatusCode::OK,
        &AuditEnvelope {
            status: "success",
            data: Some(&stats),
            message: None,
            timestamp,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::FailingStore;
    use crate::routes::test_support::body_json;
    use crate::server::{test_state, test_state_with};
    use bson::doc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_envelope() {
        let state = test_state(vec![
            doc! { "slug": "a", "primaryDomain": "a.example", "operational": { "status": "active" } },
            doc! { "slug": "a", "primaryDomain": "b.example" },
        ]);
        let response = handle_audit(&state).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert!(body.get("message").is_none());
        assert!(body["timestamp"].is_string());
        assert_eq!(body["data"]["totalDocuments"], 2);
        assert_eq!(body["data"]["slugAnalysis"]["duplicates"][0]["value"], "a");
        assert_eq!(body["data"]["slugAnalysis"]["duplicates"][0]["count"], 2);
    }

    #[tokio::test]
    async fn test_failure_envelope() {
        let response = handle_audit(&test_state_with(Arc::new(FailingStore))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Failed to generate audit report");
        assert!(body.get("data").is_none());
    }
}
