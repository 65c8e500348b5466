// UI and formatting module

pub mod formatters;
pub mod live;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_bytes, format_duration, format_rate, format_timestamp};
pub use live::render_snapshot;
