//! Shared types for Chastor

mod error;

pub use error::{ChastorError, Operation, Result};
