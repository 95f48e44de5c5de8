//! Host-side utilities for serial port discovery.

use crate::error::Result;
use crate::port::PortInfo;

/// Discover all available serial ports, sorted by name.
#[cfg(feature = "native")]
pub fn discover_ports() -> Result<Vec<PortInfo>> {
    use crate::port::{NativePortEnumerator, PortEnumerator};

    let mut ports = NativePortEnumerator::list_ports()?;
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    log::debug!("Found {} serial port(s)", ports.len());
    Ok(ports)
}

/// Discover all available serial ports.
///
/// Always empty without native serial support.
#[cfg(not(feature = "native"))]
pub fn discover_ports() -> Result<Vec<PortInfo>> {
    Ok(Vec::new())
}

/// Discover USB serial ports only.
///
/// The Mojo enumerates as a USB CDC device, so onboard UARTs and
/// Bluetooth serial links can be skipped when guessing.
pub fn discover_usb_ports() -> Result<Vec<PortInfo>> {
    Ok(discover_ports()?
        .into_iter()
        .filter(|p| p.vid.is_some())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_ports_no_panic() {
        let _ = discover_ports();
    }

    #[test]
    fn test_usb_ports_have_ids() {
        if let Ok(ports) = discover_usb_ports() {
            assert!(ports.iter().all(|p| p.vid.is_some()));
        }
    }
}
