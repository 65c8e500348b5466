// Netwatch Library - Public API

// Re-export error types
pub mod error;
pub use error::{NetwatchError, Result};

// Module declarations
pub mod commands;
pub mod core;
pub mod platform;
pub mod storage;
pub mod ui;

// Re-export commonly used types
pub use core::config::{AppConfig, MonitorSettings};

// Initialize logging (Info by default, RUST_LOG overrides)
pub fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
