pub mod error;
pub mod store;

pub use error::AuditError;
pub use remedy_core::AuditLogEntry;
pub use store::AuditStore;
