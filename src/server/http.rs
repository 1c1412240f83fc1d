//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every route is a GET
//! that answers with JSON.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::HeaderValue;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::db::{ConnectionProvider, MemoryPlatformStore, MongoPlatformStore, PlatformStore};
use crate::routes;
use crate::services::{AuditService, PlatformService};
use crate::types::ChastorError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const PLATFORM_PREFIX: &str = "/api/platforms/";

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Store shared by both services
    pub store: Arc<dyn PlatformStore>,
    pub platforms: PlatformService,
    pub audit: AuditService,
    /// Connection provider, absent when serving fixtures
    pub provider: Option<Arc<ConnectionProvider>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn PlatformStore>,
        provider: Option<Arc<ConnectionProvider>>,
    ) -> Self {
        Self {
            args,
            platforms: PlatformService::new(Arc::clone(&store)),
            audit: AuditService::new(Arc::clone(&store)),
            store,
            provider,
            started_at: Instant::now(),
        }
    }

    /// State backed by MongoDB. No connection is opened until the first query.
    pub fn with_mongo(args: Args) -> Self {
        let provider = ConnectionProvider::for_args(&args);
        let store = Arc::new(MongoPlatformStore::new(Arc::clone(&provider)));
        Self::new(args, store, Some(provider))
    }

    /// State serving an in-memory fixture catalog
    pub fn with_fixtures(args: Args, store: MemoryPlatformStore) -> Self {
        Self::new(args, Arc::new(store), None)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), ChastorError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Chastor listening on {} (db target: {}, store: {})",
        state.args.listen,
        state.args.db_target,
        state.store.kind()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - one connection is kept for the whole process");
    }

    if let Some(ref provider) = state.provider {
        if !provider.is_configured() {
            warn!(
                "{} is not set; database routes will fail until it is",
                state.args.db_target.uri_variable()
            );
        }
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    info!("[{}] {} {}", addr, method, path);

    let response = dispatch(&state, &method, &path, query.as_deref()).await;
    debug!("[{}] {} {} -> {}", addr, method, path, response.status());

    Ok(to_boxed(response))
}

/// Route a request to its handler
pub async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/health" | "/healthz") => routes::health_check(state),
        (&Method::GET, "/version") => routes::version_info(),

        (&Method::GET, "/api/audit") => routes::handle_audit(state).await,
        (&Method::GET, "/api/test-db") => routes::handle_test_db(state).await,

        (&Method::GET, "/api/platforms") => routes::handle_list(state, query).await,
        (&Method::GET, "/api/platforms/count") => routes::handle_count(state).await,
        (&Method::GET, p) if p.starts_with(PLATFORM_PREFIX) => {
            let slug = &p[PLATFORM_PREFIX.len()..];
            if slug.is_empty() || slug.contains('/') {
                not_found_response(p)
            } else {
                routes::handle_get(state, slug).await
            }
        }

        _ => not_found_response(path),
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = routes::plain_response(StatusCode::OK, "");
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, OPTIONS"),
    );
    response
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "Not Found", "path": path }),
    )
}

#[cfg(test)]
pub(crate) fn test_state_with(store: Arc<dyn PlatformStore>) -> AppState {
    use clap::Parser;
    let args = Args::parse_from(["chastor", "--db-target", "local"]);
    AppState::new(args, store, None)
}

#[cfg(test)]
pub(crate) fn test_state(docs: Vec<bson::Document>) -> AppState {
    test_state_with(Arc::new(MemoryPlatformStore::new(docs)))
}
