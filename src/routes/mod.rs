//! HTTP routes for Chastor

pub mod audit;
pub mod health;
pub mod platforms;
pub mod test_db;

pub use audit::handle_audit;
pub use health::{health_check, version_info};
pub use platforms::{handle_count, handle_get, handle_list};
pub use test_db::handle_test_db;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::ChastorError;

/// JSON response with permissive CORS
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(json)))
            .unwrap_or_else(|_| {
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build response")
            }),
        Err(_) => plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to serialize response",
        ),
    }
}

/// Bare text response that cannot fail to build
pub fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}

/// `{error, message}` body for a failed request
pub fn error_response(err: &ChastorError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    let body = serde_json::json!({
        "error": status.canonical_reason().unwrap_or("Error"),
        "message": err.public_message(),
    });
    json_response(status, &body)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;

    #[tokio::test]
    async fn test_error_response_hides_driver_detail() {
        let err = ChastorError::Database("socket closed at 10.0.0.4".into()).during(Operation::List);
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );

        let body = test_support::body_json(response).await;
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["message"], "Failed to get platforms");
    }

    #[tokio::test]
    async fn test_connection_errors_are_unavailable() {
        let response = error_response(&ChastorError::Connection("timeout".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
