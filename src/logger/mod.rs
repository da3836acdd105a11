//! Activity logging: JSONL always, SQLite (WAL) when the `sqlite` feature is on.

pub mod activity;
pub mod jsonl;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
pub mod stats;
