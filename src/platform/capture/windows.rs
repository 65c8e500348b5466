//! Windows capture through the Npcap driver.

use winreg::enums::HKEY_LOCAL_MACHINE;
use winreg::RegKey;

use super::DriverStatus;

pub const BACKEND_NAME: &str = "npcap";

const NPCAP_KEYS: &[&str] = &[r"SOFTWARE\Npcap", r"SOFTWARE\WOW6432Node\Npcap", r"SOFTWARE\Nmap\Npcap"];

/// Npcap registers itself under HKLM when installed.
pub fn driver_status() -> DriverStatus {
    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);

    for key in NPCAP_KEYS {
        if hklm.open_subkey(key).is_ok() {
            return DriverStatus {
                available: true,
                message: "Npcap is installed".to_string(),
            };
        }
    }

    DriverStatus {
        available: false,
        message: "Npcap not found in registry".to_string(),
    }
}
