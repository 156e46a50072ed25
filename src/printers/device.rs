use log::debug;
use sysinfo::System;

const DMI_SERIAL: &str = "/sys/class/dmi/id/product_serial";
const FALLBACK_ID: &str = "unknown-device";

/// Identifier clients use to tell print stations apart: the configured
/// override, the hardware serial, or the host name.
pub fn device_id(override_id: Option<&str>) -> String {
    if let Some(id) = override_id {
        return id.to_string();
    }
    choose(hardware_serial(), System::host_name())
}

fn choose(serial: Option<String>, host_name: Option<String>) -> String {
    serial
        .filter(|s| is_real_serial(s))
        .or_else(|| host_name.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()))
        .unwrap_or_else(|| FALLBACK_ID.to_string())
}

fn hardware_serial() -> Option<String> {
    match std::fs::read_to_string(DMI_SERIAL) {
        Ok(content) => Some(content.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => {
            debug!("Could not read {}: {}", DMI_SERIAL, e);
            None
        }
    }
}

/// Vendors ship boards with placeholder serials.
fn is_real_serial(serial: &str) -> bool {
    let lower = serial.to_ascii_lowercase();
    ![
        "to be filled by o.e.m.",
        "default string",
        "system serial number",
        "not specified",
        "none",
        "0",
    ]
    .contains(&lower.as_str())
        && !lower.chars().all(|c| c == '0')
}
