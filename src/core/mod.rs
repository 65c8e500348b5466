// Core business logic module

pub mod config;
pub mod monitor;

// Re-export commonly used items
pub use config::{default_database_path, AppConfig, MonitorSettings};
pub use monitor::{MonitorController, MonitorRuntime, TickSnapshot};
