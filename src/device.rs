//! Advertised device identity

use core::fmt::Write;

use heapless::String;

use crate::config::ble::DEVICE_NAME;

/// Room for the base name, a dash and six hex digits
pub type DeviceName = String<20>;

/// Build "EMG-Sensor-XXXXXX" from the last three MAC bytes
pub fn format_device_name(device_id: &[u8; 3]) -> DeviceName {
    let mut name = DeviceName::new();
    let [a, b, c] = *device_id;
    if write!(name, "{}-{:02X}{:02X}{:02X}", DEVICE_NAME, a, b, c).is_err() {
        name.clear();
        let _ = name.push_str(DEVICE_NAME);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name_from_id() {
        let name = format_device_name(&[0x0A, 0xBC, 0x01]);
        assert_eq!(name.as_str(), "EMG-Sensor-0ABC01");
    }

    #[test]
    fn test_device_name_fits_adv_name() {
        let name = format_device_name(&[0xFF, 0xFF, 0xFF]);
        assert_eq!(name.len(), DEVICE_NAME.len() + 7);
        assert!(name.len() <= name.capacity());
    }
}
