//! Linux capture: AF_PACKET sockets provided by the kernel.

use super::DriverStatus;

pub const BACKEND_NAME: &str = "af_packet";

/// AF_PACKET needs no separate driver, only the socket family.
pub fn driver_status() -> DriverStatus {
    let path = std::path::Path::new("/proc/net/packet");
    if path.exists() {
        DriverStatus {
            available: true,
            message: "AF_PACKET sockets available".to_string(),
        }
    } else {
        DriverStatus {
            available: false,
            message: "kernel lacks AF_PACKET support (/proc/net/packet missing)".to_string(),
        }
    }
}
