//! Local record store for Archiva

mod connection;
mod migrations;
mod pending_repository;
mod repository;

pub use connection::Database;
pub use pending_repository::{LibSqlPendingRepository, PendingRepository};
pub use repository::{LibSqlRecordRepository, RecordRepository};
