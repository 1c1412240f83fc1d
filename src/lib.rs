//! Chastor - directory of fractional real-estate investment platforms
//!
//! Read-only data layer over a MongoDB `platforms` collection, served as a
//! small JSON API.
//!
//! ## Services
//!
//! - **Platforms**: count, fetch by slug, filtered listing
//! - **Audit**: single-pass data-quality report (missing keys, duplicates,
//!   status distribution, enrichment coverage)
//!
//! The connection to MongoDB is opened lazily on first use and shared by
//! every request. In development the catalog can also be served from a JSON
//! fixture file.

pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ChastorError, Result};
