//! Read services over the platform store

pub mod audit;
pub mod platforms;

pub use audit::{
    audit_pipeline, AuditService, AuditStats, DuplicateEntry, Enrichment, DuplicateAnalysis,
    StatusBucket, MISSING_STATUS_LABEL,
};
pub use platforms::{ListFilter, PlatformService, StatusFilter, DEFAULT_STATUS};
