// Platform-specific code module

pub mod capture;
pub mod elevation;
pub mod resolver;

pub use capture::{
    capabilities, get_capture_backend, get_capture_provider, CapabilityReport, SystemCaptureProvider,
};
pub use elevation::{has_capture_privilege, is_elevated};
pub use resolver::DnsResolver;
