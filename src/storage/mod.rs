mod invoices;
mod ledger;
mod repository;
mod rows;

pub use invoices::*;
pub use ledger::*;
pub use repository::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
