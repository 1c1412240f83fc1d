//! Platform query service
//!
//! Read operations against the `platforms` collection. Each call is a single
//! round-trip through the shared store. Store failures are logged here and
//! re-raised as [`ChastorError::Query`] carrying the failing operation.

use bson::{doc, Bson, Document};
use std::sync::Arc;
use tracing::{debug, error};

use crate::db::schemas::{Platform, PlatformSummary, HEAVY_FIELDS, LISTING_FIELDS};
use crate::db::PlatformStore;
use crate::types::{ChastorError, Operation, Result};

/// Status used when a listing does not ask for one
pub const DEFAULT_STATUS: &str = "active";

/// Which `operational.status` values a listing returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    /// Every document, including those without a status
    All,
    /// Exact match on `operational.status`
    Exact(String),
}

impl StatusFilter {
    /// `"all"` selects everything, an empty value selects nothing in particular.
    /// Other values are matched exactly, surrounding whitespace included.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" => None,
            "all" => Some(Self::All),
            status => Some(Self::Exact(status.to_string())),
        }
    }
}

/// Listing filter; an absent status falls back to [`DEFAULT_STATUS`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<StatusFilter>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self {
            status: Some(StatusFilter::All),
        }
    }

    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(StatusFilter::Exact(status.into())),
        }
    }

    /// Query document for this filter
    pub fn to_query(&self) -> Document {
        match &self.status {
            Some(StatusFilter::All) => doc! {},
            Some(StatusFilter::Exact(status)) => doc! { "operational.status": status.as_str() },
            None => doc! { "operational.status": DEFAULT_STATUS },
        }
    }
}

fn exclusion(fields: &[&str]) -> Document {
    fields.iter().map(|f| (f.to_string(), Bson::Int32(0))).collect()
}

fn inclusion(fields: &[&str]) -> Document {
    fields.iter().map(|f| (f.to_string(), Bson::Int32(1))).collect()
}

/// Read-only access to platform records
#[derive(Clone)]
pub struct PlatformService {
    store: Arc<dyn PlatformStore>,
}

impl PlatformService {
    pub fn new(store: Arc<dyn PlatformStore>) -> Self {
        Self { store }
    }

    /// Number of documents in the collection
    pub async fn count(&self) -> Result<u64> {
        self.store.count_documents(doc! {}).await.map_err(|e| {
            error!("Failed to get platforms count: {}", e);
            e.during(Operation::Count)
        })
    }

    /// Platform with this slug, without heavy fields.
    ///
    /// `Ok(None)` when nothing matches; a missing record is not an error.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Platform>> {
        let operation = || Operation::Fetch {
            slug: slug.to_string(),
        };

        let raw = self
            .store
            .find_one(doc! { "slug": slug }, exclusion(&HEAVY_FIELDS))
            .await
            .map_err(|e| {
                error!(slug = %slug, "Failed to get platform: {}", e);
                e.during(operation())
            })?;

        let Some(raw) = raw else {
            debug!(slug = %slug, "Platform not found");
            return Ok(None);
        };

        Platform::from_document(raw).map(Some).map_err(|e| {
            error!(slug = %slug, "Failed to decode platform: {}", e);
            e.during(operation())
        })
    }

    /// Platforms matching the filter, projected to the listing fields
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<Platform>> {
        let query = filter.to_query();
        debug!(?query, "Listing platforms");

        let raw = self
            .store
            .find(query, inclusion(&LISTING_FIELDS))
            .await
            .map_err(|e| {
                error!("Failed to get platforms: {}", e);
                e.during(Operation::List)
            })?;

        raw.into_iter()
            .map(Platform::from_document)
            .collect::<Result<Vec<_>>>()
            .map_err(|e: ChastorError| {
                error!("Failed to decode platforms: {}", e);
                e.during(Operation::List)
            })
    }

    /// Listing rows ready for rendering
    pub async fn list_summaries(&self, filter: &ListFilter) -> Result<Vec<PlatformSummary>> {
        Ok(self
            .list(filter)
            .await?
            .iter()
            .map(PlatformSummary::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::FailingStore;
    use crate::db::MemoryPlatformStore;

    fn service(docs: Vec<Document>) -> PlatformService {
        PlatformService::new(Arc::new(MemoryPlatformStore::new(docs)))
    }

    fn catalog() -> Vec<Document> {
        vec![
            doc! {
                "slug": "demo",
                "name": "Demo Estate",
                "primaryDomain": "demo.example",
                "operational": { "status": "active", "notes": "internal" },
                "mobileApps": [{ "url": "https://play.google.com/demo", "store": "google_play" }],
                "socialProfiles": [{ "url": "https://x.com/demo", "platform": "X" }],
                "dataSources": [{ "role": "primary", "kind": "website", "url": "https://demo.example" }],
                "theCrowdSpace": { "theCrowdSpaceUrl": "https://thecrowdspace.com/demo" },
                "meta": { "createdAt": "2024-01-01" },
                "projectRoutes": { "baseUrls": ["https://demo.example/projects"] },
            },
            doc! { "slug": "sleepy", "name": "Sleepy", "operational": { "status": "inactive" } },
            doc! { "slug": "soon", "name": "Soon", "operational": { "status": "in_development" } },
            doc! { "slug": "nostatus", "name": "No Status" },
        ]
    }

    #[test]
    fn test_status_filter_parse() {
        assert_eq!(StatusFilter::parse(""), None);
        assert_eq!(StatusFilter::parse("all"), Some(StatusFilter::All));
        assert_eq!(
            StatusFilter::parse(" active "),
            Some(StatusFilter::Exact(" active ".into()))
        );
        assert_eq!(
            StatusFilter::parse("inactive"),
            Some(StatusFilter::Exact("inactive".into()))
        );
    }

    #[test]
    fn test_filter_queries() {
        assert_eq!(ListFilter::default().to_query(), doc! { "operational.status": "active" });
        assert_eq!(ListFilter::all().to_query(), doc! {});
        assert_eq!(
            ListFilter::with_status("uncertain").to_query(),
            doc! { "operational.status": "uncertain" }
        );
    }

    #[tokio::test]
    async fn test_count() {
        assert_eq!(service(catalog()).count().await.unwrap(), 4);
        assert_eq!(service(vec![]).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_by_slug_excludes_heavy_fields() {
        let platform = service(catalog()).get_by_slug("demo").await.unwrap().unwrap();
        assert_eq!(platform.name.as_deref(), Some("Demo Estate"));
        assert!(platform.id.is_some());

        let json = serde_json::to_value(&platform).unwrap();
        for field in HEAVY_FIELDS {
            assert!(json.get(field).is_none(), "{field} leaked into the result");
        }
        assert_eq!(json["operational"]["notes"], "internal");
        assert_eq!(json["socialProfiles"][0]["platform"], "X");
    }

    #[tokio::test]
    async fn test_get_by_slug_missing_is_none() {
        let service = service(catalog());
        assert!(service.get_by_slug("does-not-exist").await.unwrap().is_none());
        assert!(service.get_by_slug("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_defaults_to_active() {
        let platforms = service(catalog()).list(&ListFilter::default()).await.unwrap();
        assert_eq!(platforms.len(), 1);
        assert!(platforms
            .iter()
            .all(|p| p.operational.as_ref().and_then(|o| o.status.as_deref()) == Some("active")));
    }

    #[tokio::test]
    async fn test_list_all_includes_missing_status() {
        let platforms = service(catalog()).list(&ListFilter::all()).await.unwrap();
        assert_eq!(platforms.len(), 4);
        assert!(platforms.iter().any(|p| p.operational.is_none()));
    }

    #[tokio::test]
    async fn test_list_exact_status() {
        let platforms = service(catalog())
            .list(&ListFilter::with_status("inactive"))
            .await
            .unwrap();
        assert_eq!(platforms.len(), 1);
        assert_eq!(platforms[0].slug.as_deref(), Some("sleepy"));
    }

    #[tokio::test]
    async fn test_list_projects_listing_fields_only() {
        let platforms = service(catalog()).list(&ListFilter::default()).await.unwrap();
        let demo = &platforms[0];
        assert!(demo.has_mobile_app());
        assert!(demo.social_profiles.is_none());
        assert!(demo.data_sources.is_none());
        assert_eq!(demo.operational.as_ref().and_then(|o| o.notes.as_deref()), None);

        let rows = service(catalog())
            .list_summaries(&ListFilter::all())
            .await
            .unwrap();
        assert_eq!(rows.iter().filter(|r| r.has_mobile_app).count(), 1);
    }

    #[tokio::test]
    async fn test_list_survives_oddly_typed_documents() {
        let mut docs = catalog();
        docs.push(doc! {
            "slug": "odd",
            "name": "Odd",
            "operational": { "status": "active" },
            "mobileApps": "none",
        });
        docs.push(doc! { "slug": "weird-status", "operational": { "status": { "code": 1 } } });
        let service = service(docs);

        let active = service.list(&ListFilter::default()).await.unwrap();
        assert_eq!(active.len(), 2);
        let odd = active.iter().find(|p| p.slug.as_deref() == Some("odd")).unwrap();
        assert!(odd.mobile_apps.is_none());
        assert!(!odd.has_mobile_app());
        assert!(active
            .iter()
            .any(|p| p.slug.as_deref() == Some("demo") && p.has_mobile_app()));

        let everything = service.list_summaries(&ListFilter::all()).await.unwrap();
        assert_eq!(everything.len(), 6);
        let weird = everything
            .iter()
            .find(|r| r.slug.as_deref() == Some("weird-status"))
            .unwrap();
        assert!(weird.status.is_none());
    }

    #[tokio::test]
    async fn test_get_by_slug_with_numeric_tag() {
        let service = service(vec![doc! {
            "slug": "demo",
            "name": "Demo",
            "classifications": { "tags": ["reit", 2024], "productType": "equity" },
        }]);

        let platform = service.get_by_slug("demo").await.unwrap().unwrap();
        let classifications = platform.classifications.unwrap();
        assert_eq!(
            classifications.tags,
            Some(vec!["reit".to_string(), "2024".to_string()])
        );
        assert!(classifications.product_type.is_none());
    }

    #[tokio::test]
    async fn test_failures_carry_operation() {
        let service = PlatformService::new(Arc::new(FailingStore));

        match service.count().await.unwrap_err() {
            ChastorError::Query { operation, .. } => assert_eq!(operation, Operation::Count),
            other => panic!("unexpected error: {other:?}"),
        }
        match service.get_by_slug("demo").await.unwrap_err() {
            ChastorError::Query { operation, .. } => {
                assert_eq!(operation, Operation::Fetch { slug: "demo".into() })
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let err = service.list(&ListFilter::default()).await.unwrap_err();
        assert_eq!(err.public_message(), "Failed to get platforms");
    }
}
