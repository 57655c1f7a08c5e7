//! Diagnostics for the tunnel process.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
