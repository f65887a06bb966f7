//! Store implementations for the identity and audit seams

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAuditLog, MemoryUserStore};
pub use postgres::{PgAuditLog, PgUserStore};
