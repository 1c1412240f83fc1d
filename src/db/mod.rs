//! Database layer: connection, stores and document schemas

pub mod connection;
pub mod memory;
pub mod schemas;
pub mod store;

pub use connection::{ConnectionProvider, ConnectionSettings};
pub use memory::MemoryPlatformStore;
pub use store::{DatabaseInfo, MongoPlatformStore, PlatformStore, PLATFORM_COLLECTION};
