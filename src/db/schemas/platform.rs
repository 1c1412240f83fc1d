//! Platform documents and the view models built from them
//!
//! Documents in the `platforms` collection are written by a separate
//! ingestion process and are only loosely structured, so every field is
//! optional and every field is read leniently: scalars stored with another
//! type (dates as BSON datetimes, years as numbers) become text, and a value
//! of the wrong shape reads as absent instead of failing the whole document.

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::Result;

/// Fields too heavy for page rendering, dropped from detail lookups
pub const HEAVY_FIELDS: [&str; 4] = ["dataSources", "theCrowdSpace", "meta", "projectRoutes"];

/// Fields returned by listings
pub const LISTING_FIELDS: [&str; 5] = [
    "name",
    "slug",
    "operational.status",
    "primaryDomain",
    "mobileApps",
];

/// Known values of `operational.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalStatus {
    Active,
    Inactive,
    InDevelopment,
    Uncertain,
}

impl OperationalStatus {
    pub const ALL: [OperationalStatus; 4] = [
        Self::Active,
        Self::Inactive,
        Self::InDevelopment,
        Self::Uncertain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::InDevelopment => "in_development",
            Self::Uncertain => "uncertain",
        }
    }
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown operational status '{s}'"))
    }
}

/// Strings, numbers and booleans as text
fn scalar_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept strings, numbers and booleans as text; anything else reads as absent
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(scalar_text))
}

/// A value of the wrong shape reads as absent
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Non-arrays read as absent; elements of the wrong shape are skipped
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

/// Tag lists; scalar elements are kept as text
fn lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => {
            Some(items.into_iter().filter_map(scalar_text).collect())
        }
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operational {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classifications {
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub product_type: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub business_model: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub target_investors: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub asset_focus: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geography {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub hq: Option<Location>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub offices: Option<Vec<Location>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub operating_countries: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub regulator_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Regulation {
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub regulators: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub licenses: Option<Vec<License>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compliance {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub kyc_required: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub accreditation_required: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub regulation: Option<Regulation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<serde_json::Number>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tech {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub is_on_chain: Option<bool>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<Chain>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub token_standards: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub supports_fractional_ownership: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub supports_secondary_market: Option<bool>,
}

/// `store` is `google_play` or `apple_store`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MobileApp {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialProfile {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Legal {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub legal_form: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub registration_country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub registered_address: Option<String>,
}

/// Provenance record left by the ingestion process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub texts: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRoutes {
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub base_urls: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "Option::is_none")]
    pub path_prefixes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A platform as handed to rendering.
///
/// Contains no store-specific types: the storage id is a plain string and
/// datetimes are RFC 3339 text. Absent fields are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    #[serde(
        rename = "_id",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub primary_domain: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub founded_at: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub operational: Option<Operational>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Classifications>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub geography: Option<Geography>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub compliance: Option<Compliance>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tech: Option<Tech>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub mobile_apps: Option<Vec<MobileApp>>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub social_profiles: Option<Vec<SocialProfile>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub legal: Option<Legal>,

    // Heavy fields, excluded by default projections
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub data_sources: Option<Vec<DataSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub the_crowd_space: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub meta: Option<DocumentMeta>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub project_routes: Option<ProjectRoutes>,
}

impl Platform {
    /// Build the view model from a raw stored document
    pub fn from_document(doc: Document) -> Result<Self> {
        Ok(bson::from_document(to_view_document(doc))?)
    }

    /// Parsed `operational.status`; `None` when absent or not a known value
    pub fn status(&self) -> Option<OperationalStatus> {
        self.operational
            .as_ref()
            .and_then(|o| o.status.as_deref())
            .and_then(|s| s.parse().ok())
    }

    pub fn has_mobile_app(&self) -> bool {
        self.mobile_apps.as_ref().is_some_and(|apps| !apps.is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Unknown Platform")
    }
}

/// One row of the platform listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSummary {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_domain: Option<String>,
    pub has_mobile_app: bool,
}

impl From<&Platform> for PlatformSummary {
    fn from(platform: &Platform) -> Self {
        Self {
            id: platform.id.clone(),
            name: platform.display_name().to_string(),
            slug: platform.slug.clone(),
            status: platform.operational.as_ref().and_then(|o| o.status.clone()),
            primary_domain: platform.primary_domain.clone(),
            has_mobile_app: platform.has_mobile_app(),
        }
    }
}

/// Replace store-specific values with plain ones, recursively:
/// ObjectIds become hex strings and datetimes become RFC 3339 text.
pub fn to_view_document(doc: Document) -> Document {
    doc.into_iter()
        .map(|(key, value)| (key, to_view_value(value)))
        .collect()
}

fn to_view_value(value: Bson) -> Bson {
    match value {
        Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => Bson::String(text),
            Err(_) => Bson::Null,
        },
        Bson::Document(doc) => Bson::Document(to_view_document(doc)),
        Bson::Array(items) => Bson::Array(items.into_iter().map(to_view_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId, DateTime};

    #[test]
    fn test_status_round_trip_names() {
        for status in OperationalStatus::ALL {
            assert_eq!(status.as_str().parse::<OperationalStatus>(), Ok(status));
        }
        assert!("closed".parse::<OperationalStatus>().is_err());
    }

    #[test]
    fn test_object_id_becomes_string() {
        let oid = ObjectId::new();
        let platform = Platform::from_document(doc! { "_id": oid, "slug": "demo" }).unwrap();
        assert_eq!(platform.id, Some(oid.to_hex()));

        let json = serde_json::to_value(&platform).unwrap();
        assert_eq!(json["_id"], serde_json::json!(oid.to_hex()));
    }

    #[test]
    fn test_dates_and_numbers_read_leniently() {
        let platform = Platform::from_document(doc! {
            "slug": "demo",
            "foundedAt": 2019,
            "meta": { "createdAt": DateTime::from_millis(0) },
        })
        .unwrap();
        assert_eq!(platform.founded_at.as_deref(), Some("2019"));
        let created = platform.meta.and_then(|m| m.created_at).unwrap();
        assert!(created.starts_with("1970-01-01T00:00:00"));
    }

    #[test]
    fn test_wrongly_typed_fields_read_as_absent() {
        let platform = Platform::from_document(doc! {
            "slug": "odd",
            "name": "Odd Estate",
            "mobileApps": "none",
            "socialProfiles": [{ "url": "https://x.com/odd", "platform": "X" }, "broken"],
            "operational": { "status": { "code": 1 }, "notes": "kept" },
            "classifications": { "tags": ["reit", 2024, { "nested": true }], "categories": "equity" },
            "compliance": { "kycRequired": "yes", "accreditationRequired": false },
            "tech": { "chains": [{ "name": "Ethereum", "chainId": "mainnet" }] },
            "geography": "Germany",
        })
        .unwrap();

        assert_eq!(platform.slug.as_deref(), Some("odd"));
        assert!(platform.mobile_apps.is_none());
        assert!(!platform.has_mobile_app());
        assert_eq!(platform.social_profiles.as_ref().map(Vec::len), Some(1));

        let operational = platform.operational.as_ref().unwrap();
        assert!(operational.status.is_none());
        assert_eq!(operational.notes.as_deref(), Some("kept"));
        assert_eq!(platform.status(), None);

        let classifications = platform.classifications.as_ref().unwrap();
        assert_eq!(
            classifications.tags,
            Some(vec!["reit".to_string(), "2024".to_string()])
        );
        assert!(classifications.categories.is_none());

        let compliance = platform.compliance.as_ref().unwrap();
        assert!(compliance.kyc_required.is_none());
        assert_eq!(compliance.accreditation_required, Some(false));

        let chain = &platform.tech.as_ref().unwrap().chains.as_ref().unwrap()[0];
        assert_eq!(chain.name.as_deref(), Some("Ethereum"));
        assert!(chain.chain_id.is_none());
        assert!(platform.geography.is_none());
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let platform = Platform::from_document(doc! { "slug": "demo", "name": "Demo" }).unwrap();
        let json = serde_json::to_value(&platform).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"slug"));
        assert!(keys.contains(&"name"));
    }

    #[test]
    fn test_summary_flags_mobile_apps() {
        let with_app = Platform::from_document(doc! {
            "name": "Demo",
            "operational": { "status": "active" },
            "mobileApps": [{ "url": "https://apps.apple.com/x", "store": "apple_store" }],
        })
        .unwrap();
        let summary = PlatformSummary::from(&with_app);
        assert!(summary.has_mobile_app);
        assert_eq!(summary.status.as_deref(), Some("active"));
        assert_eq!(with_app.status(), Some(OperationalStatus::Active));

        let without = Platform::from_document(doc! { "mobileApps": [] }).unwrap();
        let summary = PlatformSummary::from(&without);
        assert!(!summary.has_mobile_app);
        assert_eq!(summary.name, "Unknown Platform");
    }
}
