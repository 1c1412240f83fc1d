//! Connectivity check (/api/test-db)
//!
//! Lists the databases visible through the configured connection. Always
//! answers with a JSON body; a failure is a 500 carrying the error text.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{error, info};

use crate::db::DatabaseInfo;
use crate::routes::json_response;
use crate::server::AppState;
use crate::types::Operation;

#[derive(Serialize)]
struct TestDbResponse<'a> {
    status: &'static str,
    message: &'static str,
    target_db: &'static str,
    databases: &'a [DatabaseInfo],
}

#[derive(Serialize)]
struct TestDbFailure {
    status: &'static str,
    message: &'static str,
    error: String,
}

pub async fn handle_test_db(state: &AppState) -> Response<Full<Bytes>> {
    match state.store.list_databases().await {
        Ok(databases) => {
            info!(
                target_db = %state.args.db_target,
                count = databases.len(),
                "Database connection verified"
            );
            json_response(
                StatusCode::OK,
                &TestDbResponse {
                    status: "success",
                    message: "Connected to MongoDB",
                    target_db: state.args.db_target.as_str(),
                    databases: &databases,
                },
            )
        }
        Err(e) => {
            let e = e.during(Operation::ListDatabases);
            error!("Database connection test failed: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &TestDbFailure {
                    status: "error",
                    message: "Failed to connect to MongoDB",
                    error: e.to_string(),
                },
            )
        }
    }
}
