//! Domain layer for the duel arena
//!
//! This module contains the core models (experiments, duels, score matrices,
//! competition templates) and the ports that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
