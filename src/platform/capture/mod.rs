//! Platform capture backends and capability detection.
//!
//! Linux captures through AF_PACKET, Windows through Npcap. Both are driven
//! by the same `pnet` datalink reader; only driver detection differs.

#[cfg(all(feature = "capture", any(target_os = "linux", windows)))]
mod datalink;
#[cfg(feature = "capture")]
pub mod decode;
#[cfg(all(feature = "capture", target_os = "linux"))]
mod linux;
#[cfg(all(feature = "capture", windows))]
mod windows;

use serde::Serialize;

use super::elevation;
use crate::core::monitor::capture::{CaptureBackend, CaptureCapability, CaptureProvider};
use crate::error::{NetwatchError, Result};

/// Whether the platform capture driver is usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverStatus {
    pub available: bool,
    pub message: String,
}

/// Capability summary shown by `netwatch caps`
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    pub is_elevated: bool,
    pub capture_privilege: bool,
    pub platform: &'static str,
    pub backend: Option<&'static str>,
    pub driver_available: bool,
    pub driver_message: String,
    pub deep_capture_possible: bool,
}

/// Name of the capture backend compiled for this platform
#[cfg(all(feature = "capture", target_os = "linux"))]
pub fn backend_name() -> Option<&'static str> {
    Some(linux::BACKEND_NAME)
}

#[cfg(all(feature = "capture", windows))]
pub fn backend_name() -> Option<&'static str> {
    Some(windows::BACKEND_NAME)
}

#[cfg(not(all(feature = "capture", any(target_os = "linux", windows))))]
pub fn backend_name() -> Option<&'static str> {
    None
}

#[cfg(all(feature = "capture", target_os = "linux"))]
pub fn driver_status() -> DriverStatus {
    linux::driver_status()
}

#[cfg(all(feature = "capture", windows))]
pub fn driver_status() -> DriverStatus {
    windows::driver_status()
}

#[cfg(not(all(feature = "capture", any(target_os = "linux", windows))))]
pub fn driver_status() -> DriverStatus {
    DriverStatus {
        available: false,
        message: if cfg!(feature = "capture") {
            format!("packet capture is not supported on {}", std::env::consts::OS)
        } else {
            "built without the `capture` feature".to_string()
        },
    }
}

pub fn capabilities() -> CapabilityReport {
    let driver = driver_status();
    let capture_privilege = elevation::has_capture_privilege();

    CapabilityReport {
        is_elevated: elevation::is_elevated(),
        capture_privilege,
        platform: std::env::consts::OS,
        backend: backend_name(),
        driver_available: driver.available,
        deep_capture_possible: driver.available && capture_privilege,
        driver_message: driver.message,
    }
}

/// Capture provider for the host this binary runs on
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCaptureProvider;

impl CaptureProvider for SystemCaptureProvider {
    fn capability(&self) -> CaptureCapability {
        let report = capabilities();
        CaptureCapability {
            has_privilege: report.capture_privilege,
            driver_available: report.driver_available,
            driver_message: report.driver_message,
        }
    }

    fn create_backend(&self, queue_capacity: usize) -> Result<Box<dyn CaptureBackend>> {
        get_capture_backend(queue_capacity)
    }
}

/// Backend for this platform, or `CaptureUnavailable` if none is compiled in.
pub fn get_capture_backend(queue_capacity: usize) -> Result<Box<dyn CaptureBackend>> {
    match backend_name() {
        #[cfg(all(feature = "capture", any(target_os = "linux", windows)))]
        Some(name) => Ok(Box::new(datalink::DatalinkBackend::new(name, queue_capacity))),
        _ => {
            let _ = queue_capacity;
            Err(NetwatchError::capture_unavailable(driver_status().message))
        }
    }
}

pub fn get_capture_provider() -> Box<dyn CaptureProvider> {
    Box::new(SystemCaptureProvider)
}
