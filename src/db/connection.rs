//! Lazily established MongoDB connection shared by every service
//!
//! The provider never fails at construction time. A missing connection
//! string, a bad URI or an unreachable server is reported by the first
//! call to [`ConnectionProvider::database`], so startup always succeeds
//! and only actual queries surface the problem.

use bson::doc;
use mongodb::{options::ClientOptions, Client, Database};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::config::{Args, DbTarget};
use crate::types::{ChastorError, Result};

/// Database used when neither the override nor the URI names one
pub const DEFAULT_DATABASE: &str = "test";

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(3);

static PROCESS_PROVIDER: OnceLock<Arc<ConnectionProvider>> = OnceLock::new();

/// Everything needed to open the connection for one target
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub target: DbTarget,
    pub uri: Option<String>,
    pub database: Option<String>,
}

impl ConnectionSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            target: args.db_target,
            uri: args.selected_uri().map(str::to_string),
            database: args.mongodb_db.clone(),
        }
    }
}

struct Handle {
    client: Client,
    database: Database,
}

/// Memoized connection handle
pub struct ConnectionProvider {
    settings: ConnectionSettings,
    handle: OnceCell<Handle>,
}

impl ConnectionProvider {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            handle: OnceCell::new(),
        }
    }

    /// Provider that lives for the whole process.
    ///
    /// Subsequent calls return the first provider and ignore their settings,
    /// so re-initialising the application (tests, embedded restarts) never
    /// opens a second pool.
    pub fn process_wide(settings: ConnectionSettings) -> Arc<Self> {
        PROCESS_PROVIDER
            .get_or_init(|| Arc::new(Self::new(settings)))
            .clone()
    }

    /// Pick the provider flavour for the run mode
    pub fn for_args(args: &Args) -> Arc<Self> {
        let settings = ConnectionSettings::from_args(args);
        if args.dev_mode {
            Self::process_wide(settings)
        } else {
            Arc::new(Self::new(settings))
        }
    }

    pub fn target(&self) -> DbTarget {
        self.settings.target
    }

    pub fn is_configured(&self) -> bool {
        self.settings.uri.is_some()
    }

    /// Whether a connection has been established yet
    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    /// Shared database handle, connecting on first use.
    ///
    /// Failed attempts are not memoized; the next call tries again.
    pub async fn database(&self) -> Result<&Database> {
        Ok(&self.handle().await?.database)
    }

    /// Underlying client (for server-level commands such as listDatabases)
    pub async fn client(&self) -> Result<&Client> {
        Ok(&self.handle().await?.client)
    }

    async fn handle(&self) -> Result<&Handle> {
        self.handle.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> Result<Handle> {
        let uri = self.settings.uri.as_deref().ok_or_else(|| {
            let err = ChastorError::Config(format!(
                "Please add your Mongo URI to .env with {}",
                self.settings.target.uri_variable()
            ));
            error!(target_db = %self.settings.target, "{}", err);
            err
        })?;

        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            error!(target_db = %self.settings.target, "Invalid MongoDB URI: {}", e);
            ChastorError::Config(format!("Invalid MongoDB URI: {}", e))
        })?;
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);
        options.connect_timeout.get_or_insert(SERVER_SELECTION_TIMEOUT);

        let db_name = self
            .settings
            .database
            .clone()
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let client = Client::with_options(options)?;
        let database = client.database(&db_name);

        database.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            error!(target_db = %self.settings.target, "MongoDB ping failed: {}", e);
            ChastorError::Connection(format!("MongoDB ping failed: {}", e))
        })?;

        info!(
            target_db = %self.settings.target,
            database = %db_name,
            "Connected to MongoDB"
        );

        Ok(Handle { client, database })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(uri: Option<&str>) -> ConnectionSettings {
        ConnectionSettings {
            target: DbTarget::Local,
            uri: uri.map(str::to_string),
            database: None,
        }
    }

    #[tokio::test]
    async fn test_missing_uri_fails_on_first_use() {
        let provider = ConnectionProvider::new(settings(None));
        assert!(!provider.is_configured());

        let err = provider.database().await.unwrap_err();
        match err {
            ChastorError::Config(msg) => assert!(msg.contains("MONGODB_URI_LOCAL")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!provider.is_connected());

        // Still failing, still not panicking
        assert!(provider.database().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_uri_is_config_error() {
        let provider = ConnectionProvider::new(settings(Some("not-a-uri")));
        let err = provider.database().await.unwrap_err();
        assert!(matches!(err, ChastorError::Config(_)));
    }

    #[test]
    fn test_process_wide_is_memoized() {
        let first = ConnectionProvider::process_wide(settings(None));
        let second = ConnectionProvider::process_wide(settings(Some("mongodb://other")));
        assert!(Arc::ptr_eq(&first, &second));
    }
}
