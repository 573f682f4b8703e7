//! Ports (interfaces) for the duel arena.
//!
//! Adapters implement these traits: SQLite for the queue and the result
//! store, HTTP clients and mocks for chat models.

pub mod chat_model;
pub mod duel_queue;
pub mod result_store;

pub use chat_model::{ChatError, ChatModel, ModelFactory};
pub use duel_queue::DuelQueue;
pub use result_store::ResultStore;
