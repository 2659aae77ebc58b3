//! Measurement payload encoding
//!
//! Payload layout (all multi-byte fields little-endian):
//! ```text
//! [flags: u8][value: u8 | u16][energy expended: u16]?[rr interval: u16]*
//! ```
//!
//! The flag byte tells the central which optional fields follow and whether
//! the sensor supports / currently detects skin contact.

use crate::config::gatt::MAX_MEASUREMENT_LEN;
use heapless::Vec;

/// Flag byte bits
pub mod flags {
    /// Value is a u16 instead of a u8
    pub const VALUE_FORMAT_U16: u8 = 0x01;
    /// Sensor contact detected
    pub const SENSOR_CONTACT_DETECTED: u8 = 0x02;
    /// Sensor contact supported
    pub const SENSOR_CONTACT_SUPPORTED: u8 = 0x04;
    /// Energy expended field present
    pub const ENERGY_EXPENDED: u8 = 0x08;
    /// One or more RR intervals present
    pub const RR_INTERVALS: u8 = 0x10;
}

/// Encoded measurement, ready for [`MeasurementService::send`](crate::service::MeasurementService::send)
pub type MeasurementPayload = Vec<u8, MAX_MEASUREMENT_LEN>;

/// One sample to encode
#[derive(Debug, Clone, Copy, Default)]
pub struct Measurement<'a> {
    /// Measured value
    pub value: u16,
    /// Accumulated energy, if tracked
    pub energy_expended: Option<u16>,
    /// Intervals in 1/1024 s units, oldest first
    pub rr_intervals: &'a [u16],
}

/// Capability bits reflected in the flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub sensor_contact_supported: bool,
    pub sensor_contact_detected: bool,
}

/// Encode a measurement.
///
/// RR intervals that would push the payload past the characteristic's
/// maximum length are dropped.
pub fn encode(measurement: &Measurement<'_>, capabilities: Capabilities) -> MeasurementPayload {
    let mut payload = MeasurementPayload::new();
    let mut flag_byte = 0u8;

    if capabilities.sensor_contact_supported {
        flag_byte |= flags::SENSOR_CONTACT_SUPPORTED;
        if capabilities.sensor_contact_detected {
            flag_byte |= flags::SENSOR_CONTACT_DETECTED;
        }
    }

    // Flag byte is patched in once the optional fields are known
    let _ = payload.push(0);

    if let Ok(value) = u8::try_from(measurement.value) {
        let _ = payload.push(value);
    } else {
        flag_byte |= flags::VALUE_FORMAT_U16;
        let _ = payload.extend_from_slice(&measurement.value.to_le_bytes());
    }

    if let Some(energy) = measurement.energy_expended {
        flag_byte |= flags::ENERGY_EXPENDED;
        let _ = payload.extend_from_slice(&energy.to_le_bytes());
    }

    for interval in measurement.rr_intervals {
        if payload.extend_from_slice(&interval.to_le_bytes()).is_err() {
            break;
        }
        flag_byte |= flags::RR_INTERVALS;
    }

    payload[0] = flag_byte;
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_value() {
        let payload = encode(
            &Measurement {
                value: 75,
                ..Default::default()
            },
            Capabilities::default(),
        );
        assert_eq!(payload.as_slice(), &[0x00, 75]);
    }

    #[test]
    fn test_u16_value() {
        let payload = encode(
            &Measurement {
                value: 0x0123,
                ..Default::default()
            },
            Capabilities::default(),
        );
        assert_eq!(payload.as_slice(), &[flags::VALUE_FORMAT_U16, 0x23, 0x01]);
    }

    #[test]
    fn test_sensor_contact_bits() {
        let measurement = Measurement {
            value: 60,
            ..Default::default()
        };

        let supported = Capabilities {
            sensor_contact_supported: true,
            sensor_contact_detected: false,
        };
        assert_eq!(encode(&measurement, supported)[0], flags::SENSOR_CONTACT_SUPPORTED);

        let detected = Capabilities {
            sensor_contact_supported: true,
            sensor_contact_detected: true,
        };
        assert_eq!(
            encode(&measurement, detected)[0],
            flags::SENSOR_CONTACT_SUPPORTED | flags::SENSOR_CONTACT_DETECTED
        );

        // Detected without support is not reported
        let unsupported = Capabilities {
            sensor_contact_supported: false,
            sensor_contact_detected: true,
        };
        assert_eq!(encode(&measurement, unsupported)[0], 0x00);
    }

    #[test]
    fn test_energy_and_rr_intervals() {
        let payload = encode(
            &Measurement {
                value: 80,
                energy_expended: Some(0x0201),
                rr_intervals: &[0x0300, 0x0310],
            },
            Capabilities::default(),
        );
        assert_eq!(
            payload.as_slice(),
            &[
                flags::ENERGY_EXPENDED | flags::RR_INTERVALS,
                80,
                0x01,
                0x02,
                0x00,
                0x03,
                0x10,
                0x03
            ]
        );
    }

    #[test]
    fn test_rr_intervals_truncated_at_max_len() {
        let intervals = [0x0400u16; 100];
        let payload = encode(
            &Measurement {
                value: 0x0100,
                energy_expended: None,
                rr_intervals: &intervals,
            },
            Capabilities::default(),
        );

        // 1 flag byte + 2 value bytes leaves room for 62 whole intervals
        assert_eq!(payload.len(), 3 + 62 * 2);
        assert!(payload.len() <= MAX_MEASUREMENT_LEN);
        assert_eq!(payload[0], flags::VALUE_FORMAT_U16 | flags::RR_INTERVALS);
    }
}
