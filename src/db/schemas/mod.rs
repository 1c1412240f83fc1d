//! Document structures for the platform catalog

mod platform;

pub use platform::{
    to_view_document, Chain, Classifications, Compliance, DataSource, DocumentMeta, Geography,
    Legal, License, Location, MobileApp, Operational, OperationalStatus, Platform,
    PlatformSummary, ProjectRoutes, Regulation, SocialProfile, Tech, HEAVY_FIELDS,
    LISTING_FIELDS,
};
