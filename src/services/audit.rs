//! Data-quality audit over the `platforms` collection
//!
//! All statistics come from one `$facet` aggregation so the collection is
//! scanned once. The raw facet document is then shaped into [`AuditStats`].
//! Any failure, in the store or while shaping, fails the whole audit.
//!
//! Uniqueness of `slug` and `primaryDomain` is not enforced anywhere; the
//! duplicate lists are a report, not a constraint.

use bson::{doc, Bson, Document};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::db::PlatformStore;
use crate::types::{ChastorError, Operation, Result};

/// Label for documents without `operational.status`
pub const MISSING_STATUS_LABEL: &str = "missing/undefined";

/// One value shared by several documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateEntry {
    /// `None` when the field is present but `null`
    pub value: Option<String>,
    pub count: u64,
}

/// Presence and uniqueness report for one key field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateAnalysis {
    /// Documents where the field does not exist at all
    pub missing: u64,
    /// Values held by more than one document
    pub duplicates: Vec<DuplicateEntry>,
}

impl DuplicateAnalysis {
    /// Documents involved in a duplicate, counting every copy
    pub fn duplicated_documents(&self) -> u64 {
        self.duplicates.iter().map(|d| d.count).sum()
    }

    /// Documents beyond the first for each duplicated value
    pub fn excess_documents(&self) -> u64 {
        self.duplicates.iter().map(|d| d.count.saturating_sub(1)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBucket {
    pub status: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub with_mobile_apps: u64,
    pub with_social_profiles: u64,
}

/// Audit report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_documents: u64,
    pub slug_analysis: DuplicateAnalysis,
    pub domain_analysis: DuplicateAnalysis,
    pub status_distribution: Vec<StatusBucket>,
    pub enrichment: Enrichment,
}

impl AuditStats {
    /// Any document missing its slug or primary domain
    pub fn has_critical_issues(&self) -> bool {
        self.slug_analysis.missing > 0 || self.domain_analysis.missing > 0
    }

    pub fn has_duplicates(&self) -> bool {
        !self.slug_analysis.duplicates.is_empty() || !self.domain_analysis.duplicates.is_empty()
    }

    /// Share of all documents, as a rounded percentage
    pub fn coverage_percent(&self, count: u64) -> u64 {
        if self.total_documents == 0 {
            return 0;
        }
        ((count as f64 / self.total_documents as f64) * 100.0).round() as u64
    }

    pub fn mobile_app_coverage(&self) -> u64 {
        self.coverage_percent(self.enrichment.with_mobile_apps)
    }

    pub fn social_profile_coverage(&self) -> u64 {
        self.coverage_percent(self.enrichment.with_social_profiles)
    }

    /// Shape the single document produced by [`audit_pipeline`]
    pub fn from_facets(facets: &Document) -> Result<Self> {
        let enrichment = facet(facets, "enrichment")?.first().cloned().unwrap_or_default();

        Ok(Self {
            total_documents: first_count(facets, "totalCount")?,
            slug_analysis: DuplicateAnalysis {
                missing: first_count(facets, "missingSlug")?,
                duplicates: duplicates(facets, "duplicateSlugs")?,
            },
            domain_analysis: DuplicateAnalysis {
                missing: first_count(facets, "missingDomain")?,
                duplicates: duplicates(facets, "duplicateDomains")?,
            },
            status_distribution: status_distribution(facets)?,
            enrichment: Enrichment {
                with_mobile_apps: count_value(enrichment.get("withMobileApps"))?,
                with_social_profiles: count_value(enrichment.get("withSocialProfiles"))?,
            },
        })
    }
}

/// Missing-field count and duplicate detection for one key
fn key_branches(field: &str) -> (Vec<Bson>, Vec<Bson>) {
    let missing = vec![
        Bson::Document(doc! { "$match": { field: { "$exists": false } } }),
        Bson::Document(doc! { "$count": "count" }),
    ];
    let duplicates = vec![
        Bson::Document(doc! { "$match": { field: { "$exists": true } } }),
        Bson::Document(doc! { "$group": { "_id": format!("${field}"), "count": { "$sum": 1 } } }),
        Bson::Document(doc! { "$match": { "count": { "$gt": 1 } } }),
    ];
    (missing, duplicates)
}

/// 1 when the field is a non-empty array, else 0
fn non_empty_array(field: &str) -> Document {
    let path = format!("${field}");
    doc! {
        "$sum": {
            "$cond": [
                { "$and": [{ "$isArray": path.as_str() }, { "$gt": [{ "$size": path.as_str() }, 0] }] },
                1,
                0
            ]
        }
    }
}

/// The single-pass audit aggregation
pub fn audit_pipeline() -> Vec<Document> {
    let (missing_slug, duplicate_slugs) = key_branches("slug");
    let (missing_domain, duplicate_domains) = key_branches("primaryDomain");

    vec![doc! {
        "$facet": {
            "totalCount": [{ "$count": "count" }],
            "missingSlug": missing_slug,
            "duplicateSlugs": duplicate_slugs,
            "missingDomain": missing_domain,
            "duplicateDomains": duplicate_domains,
            "statusDistribution": [
                { "$group": { "_id": "$operational.status", "count": { "$sum": 1 } } }
            ],
            "enrichment": [{
                "$group": {
                    "_id": Bson::Null,
                    "withMobileApps": non_empty_array("mobileApps"),
                    "withSocialProfiles": non_empty_array("socialProfiles"),
                }
            }],
        }
    }]
}

fn malformed(message: String) -> ChastorError {
    ChastorError::Database(format!("Malformed audit result: {message}"))
}

fn facet(facets: &Document, name: &str) -> Result<Vec<Document>> {
    match facets.get(name) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc.clone()),
                other => Err(malformed(format!("{name} holds {other}"))),
            })
            .collect(),
        Some(other) => Err(malformed(format!("{name} is {other}"))),
    }
}

fn count_value(value: Option<&Bson>) -> Result<u64> {
    match value {
        None | Some(Bson::Null) => Ok(0),
        Some(Bson::Int32(n)) => Ok((*n).max(0) as u64),
        Some(Bson::Int64(n)) => Ok((*n).max(0) as u64),
        Some(Bson::Double(n)) => Ok((*n).max(0.0) as u64),
        Some(other) => Err(malformed(format!("count is {other}"))),
    }
}

/// `$count` emits nothing for an empty input, which reads as zero
fn first_count(facets: &Document, name: &str) -> Result<u64> {
    match facet(facets, name)?.first() {
        Some(doc) => count_value(doc.get("count")),
        None => Ok(0),
    }
}

fn group_label(id: Option<&Bson>) -> Option<String> {
    match id {
        None | Some(Bson::Null) | Some(Bson::Undefined) => None,
        Some(Bson::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn duplicates(facets: &Document, name: &str) -> Result<Vec<DuplicateEntry>> {
    let mut entries = facet(facets, name)?
        .iter()
        .map(|doc| {
            Ok(DuplicateEntry {
                value: group_label(doc.get("_id")),
                count: count_value(doc.get("count"))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    Ok(entries)
}

/// Null, missing and empty statuses share the missing bucket
fn status_distribution(facets: &Document) -> Result<Vec<StatusBucket>> {
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
    for doc in facet(facets, "statusDistribution")? {
        let label = group_label(doc.get("_id"))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| MISSING_STATUS_LABEL.to_string());
        *buckets.entry(label).or_default() += count_value(doc.get("count"))?;
    }

    let mut distribution: Vec<StatusBucket> = buckets
        .into_iter()
        .map(|(status, count)| StatusBucket { status, count })
        .collect();
    distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));
    Ok(distribution)
}

/// Computes [`AuditStats`] through the shared store
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn PlatformStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn PlatformStore>) -> Self {
        Self { store }
    }

    pub async fn compute_stats(&self) -> Result<AuditStats> {
        let stats = self.run().await.map_err(|e| {
            error!("Audit aggregation failed: {}", e);
            e.during(Operation::Audit)
        })?;

        info!(
            total = stats.total_documents,
            missing_slugs = stats.slug_analysis.missing,
            missing_domains = stats.domain_analysis.missing,
            duplicate_slugs = stats.slug_analysis.duplicates.len(),
            duplicate_domains = stats.domain_analysis.duplicates.len(),
            "Platform audit completed"
        );

        Ok(stats)
    }

    async fn run(&self) -> Result<AuditStats> {
        let results = self.store.aggregate(audit_pipeline()).await?;
        let facets = results
            .first()
            .ok_or_else(|| malformed("aggregation returned no document".into()))?;
        AuditStats::from_facets(facets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::FailingStore;
    use crate::db::MemoryPlatformStore;
    use tokio_test::{assert_err, assert_ok};

    async fn audit(docs: Vec<Document>) -> AuditStats {
        let service = AuditService::new(Arc::new(MemoryPlatformStore::new(docs)));
        assert_ok!(service.compute_stats().await)
    }

    fn bucket(stats: &AuditStats, status: &str) -> Option<u64> {
        stats
            .status_distribution
            .iter()
            .find(|b| b.status == status)
            .map(|b| b.count)
    }

    #[tokio::test]
    async fn test_three_document_scenario() {
        let stats = audit(vec![
            doc! { "slug": "a", "operational": { "status": "active" } },
            doc! { "slug": "a", "operational": { "status": "inactive" } },
            doc! { "name": "nameless" },
        ])
        .await;

        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.slug_analysis.missing, 1);
        assert_eq!(
            stats.slug_analysis.duplicates,
            vec![DuplicateEntry {
                value: Some("a".into()),
                count: 2
            }]
        );
        assert_eq!(bucket(&stats, "active"), Some(1));
        assert_eq!(bucket(&stats, "inactive"), Some(1));
        assert_eq!(bucket(&stats, MISSING_STATUS_LABEL), Some(1));
        assert_eq!(stats.status_distribution.len(), 3);
        assert!(stats.has_critical_issues());
        assert!(stats.has_duplicates());
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let stats = audit(vec![]).await;
        assert_eq!(stats, AuditStats::default());
        assert_eq!(stats.mobile_app_coverage(), 0);
        assert!(!stats.has_critical_issues());
    }

    #[tokio::test]
    async fn test_shared_domain_reported_once() {
        let mut docs: Vec<Document> = (0..4)
            .map(|i| doc! { "slug": format!("p{i}"), "primaryDomain": "example.com" })
            .collect();
        docs.push(doc! { "slug": "solo", "primaryDomain": "solo.example" });

        let stats = audit(docs).await;
        assert_eq!(
            stats.domain_analysis.duplicates,
            vec![DuplicateEntry {
                value: Some("example.com".into()),
                count: 4
            }]
        );
        assert_eq!(stats.domain_analysis.excess_documents(), 3);
        assert!(stats.slug_analysis.duplicates.is_empty());
    }

    #[tokio::test]
    async fn test_status_total_matches_document_count() {
        let stats = audit(vec![
            doc! { "operational": { "status": "active" } },
            doc! { "operational": { "status": "active" } },
            doc! { "operational": { "status": "uncertain" } },
            doc! { "operational": { "status": Bson::Null } },
            doc! { "operational": { "status": "" } },
            doc! { "operational": {} },
            doc! {},
        ])
        .await;

        let sum: u64 = stats.status_distribution.iter().map(|b| b.count).sum();
        assert_eq!(sum, stats.total_documents);
        assert_eq!(bucket(&stats, MISSING_STATUS_LABEL), Some(4));
        assert_eq!(stats.status_distribution[0].count, 4);
        assert_eq!(bucket(&stats, "active"), Some(2));
    }

    #[tokio::test]
    async fn test_duplicates_only_above_one_and_excess_count() {
        let stats = audit(vec![
            doc! { "slug": "x" },
            doc! { "slug": "x" },
            doc! { "slug": "x" },
            doc! { "slug": "y" },
            doc! { "slug": "y" },
            doc! { "slug": "z" },
            doc! { "slug": Bson::Null },
        ])
        .await;

        let analysis = &stats.slug_analysis;
        assert!(analysis.duplicates.iter().all(|d| d.count > 1));
        assert_eq!(analysis.duplicates[0].value.as_deref(), Some("x"));
        assert_eq!(analysis.excess_documents(), 3);
        assert_eq!(analysis.duplicated_documents(), 5);
        // null is present, so it is neither missing nor duplicated
        assert_eq!(analysis.missing, 0);
    }

    #[tokio::test]
    async fn test_enrichment_counts_non_empty_arrays_only() {
        let stats = audit(vec![
            doc! { "mobileApps": [{ "store": "apple_store" }], "socialProfiles": [{ "platform": "X" }] },
            doc! { "mobileApps": [], "socialProfiles": [{ "platform": "linkedin" }] },
            doc! { "mobileApps": "not-a-list" },
            doc! {},
        ])
        .await;

        assert_eq!(stats.enrichment.with_mobile_apps, 1);
        assert_eq!(stats.enrichment.with_social_profiles, 2);
        assert_eq!(stats.mobile_app_coverage(), 25);
        assert_eq!(stats.social_profile_coverage(), 50);
    }

    #[test]
    fn test_from_facets_accepts_driver_integer_widths() {
        let facets = doc! {
            "totalCount": [{ "count": 2_i32 }],
            "missingSlug": [],
            "duplicateSlugs": [],
            "missingDomain": [{ "count": 1_i64 }],
            "duplicateDomains": [],
            "statusDistribution": [{ "_id": "active", "count": 2_i32 }],
            "enrichment": [{ "_id": Bson::Null, "withMobileApps": 1_i32, "withSocialProfiles": 0_i32 }],
        };
        let stats = AuditStats::from_facets(&facets).unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.domain_analysis.missing, 1);
        assert_eq!(stats.enrichment.with_mobile_apps, 1);
    }

    #[test]
    fn test_from_facets_rejects_malformed_counts() {
        let facets = doc! { "totalCount": [{ "count": "two" }] };
        assert!(AuditStats::from_facets(&facets).is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let stats = AuditStats {
            total_documents: 1,
            status_distribution: vec![StatusBucket {
                status: MISSING_STATUS_LABEL.into(),
                count: 1,
            }],
            ..AuditStats::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalDocuments"], 1);
        assert_eq!(json["slugAnalysis"]["missing"], 0);
        assert!(json["domainAnalysis"]["duplicates"].is_array());
        assert_eq!(json["statusDistribution"][0]["status"], "missing/undefined");
        assert_eq!(json["enrichment"]["withMobileApps"], 0);
    }

    #[tokio::test]
    async fn test_failure_is_all_or_nothing() {
        let service = AuditService::new(Arc::new(FailingStore));
        match assert_err!(service.compute_stats().await) {
            ChastorError::Query { operation, .. } => assert_eq!(operation, Operation::Audit),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
