//! Adapters: SQLite persistence and chat model providers.

pub mod sqlite;
pub mod substrates;
