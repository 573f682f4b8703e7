//! Structured logging using tracing and tracing-subscriber:
//! console output plus an optional JSON log file.

pub mod logger;

pub use logger::{LoggerImpl, LOG_FILE_NAME};
