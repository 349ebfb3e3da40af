//! # netledger-store
//!
//! SQLite persistence for captured packets, built on `sqlx`.

pub mod schema;
pub mod sqlite;

pub use schema::{init_schema, read_schema_file};
pub use sqlite::SqlitePacketStore;
