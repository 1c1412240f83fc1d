//! Read-only access to the `platforms` collection
//!
//! [`PlatformStore`] is the seam between the services and the storage
//! engine. The services build filters, projections and pipelines as plain
//! BSON; a store only executes them.

use bson::Document;
use futures::TryStreamExt;
use mongodb::Collection;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::db::connection::ConnectionProvider;
use crate::types::Result;

/// Collection holding one document per platform
pub const PLATFORM_COLLECTION: &str = "platforms";

/// Database entry reported by the connection check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    pub size_on_disk: u64,
    pub empty: bool,
}

/// Executes read queries against the platform documents.
///
/// An empty `projection` document means "return every field".
#[async_trait::async_trait]
pub trait PlatformStore: Send + Sync {
    /// Short name for logs and health output
    fn kind(&self) -> &'static str;

    async fn count_documents(&self, filter: Document) -> Result<u64>;

    async fn find_one(&self, filter: Document, projection: Document) -> Result<Option<Document>>;

    async fn find(&self, filter: Document, projection: Document) -> Result<Vec<Document>>;

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    /// Databases visible through the connection
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;
}

/// MongoDB-backed store sharing the process connection
#[derive(Clone)]
pub struct MongoPlatformStore {
    provider: Arc<ConnectionProvider>,
}

impl MongoPlatformStore {
    pub fn new(provider: Arc<ConnectionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<ConnectionProvider> {
        &self.provider
    }

    async fn collection(&self) -> Result<Collection<Document>> {
        let db = self.provider.database().await?;
        Ok(db.collection::<Document>(PLATFORM_COLLECTION))
    }
}

#[async_trait::async_trait]
impl PlatformStore for MongoPlatformStore {
    fn kind(&self) -> &'static str {
        "mongodb"
    }

    async fn count_documents(&self, filter: Document) -> Result<u64> {
        let collection = self.collection().await?;
        Ok(collection.count_documents(filter).await?)
    }

    async fn find_one(&self, filter: Document, projection: Document) -> Result<Option<Document>> {
        let collection = self.collection().await?;
        debug!(?filter, "find_one on {}", PLATFORM_COLLECTION);
        Ok(collection.find_one(filter).projection(projection).await?)
    }

    async fn find(&self, filter: Document, projection: Document) -> Result<Vec<Document>> {
        let collection = self.collection().await?;
        debug!(?filter, "find on {}", PLATFORM_COLLECTION);
        let cursor = collection.find(filter).projection(projection).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let collection = self.collection().await?;
        debug!(stages = pipeline.len(), "aggregate on {}", PLATFORM_COLLECTION);
        let cursor = collection.aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let client = self.provider.client().await?;
        let databases = client.list_databases().await?;
        Ok(databases
            .into_iter()
            .map(|db| DatabaseInfo {
                name: db.name,
                size_on_disk: db.size_on_disk,
                empty: db.empty,
            })
            .collect())
    }
}

/// Store whose every call fails, for exercising error paths
#[cfg(test)]
pub(crate) struct FailingStore;

#[cfg(test)]
#[async_trait::async_trait]
impl PlatformStore for FailingStore {
    fn kind(&self) -> &'static str {
        "failing"
    }

    async fn count_documents(&self, _filter: Document) -> Result<u64> {
        Err(crate::types::ChastorError::Database("socket closed".into()))
    }

    async fn find_one(&self, _filter: Document, _projection: Document) -> Result<Option<Document>> {
        Err(crate::types::ChastorError::Database("socket closed".into()))
    }

    async fn find(&self, _filter: Document, _projection: Document) -> Result<Vec<Document>> {
        Err(crate::types::ChastorError::Database("socket closed".into()))
    }

    async fn aggregate(&self, _pipeline: Vec<Document>) -> Result<Vec<Document>> {
        Err(crate::types::ChastorError::Database("socket closed".into()))
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        Err(crate::types::ChastorError::Connection("server selection timed out".into()))
    }
}
