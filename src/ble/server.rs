//! GATT table for the measurement service
//!
//! - Service: Heart Rate (0x180D), reused by the EMG sensor family
//! - Measurement (0x2A37): notify, variable length up to 128 bytes
//! - Body Sensor Location (0x2A38): read

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use trouble_host::prelude::*;

use crate::config::gatt::MAX_MEASUREMENT_LEN;
use crate::config::sampling::BODY_SENSOR_LOCATION;

/// Measurement service attributes
#[gatt_service(uuid = service::HEART_RATE)]
pub struct MeasurementGattService {
    /// Measurement value, only ever notified
    #[characteristic(uuid = characteristic::HEART_RATE_MEASUREMENT, notify, value = heapless::Vec::new())]
    pub measurement: heapless::Vec<u8, MAX_MEASUREMENT_LEN>,

    /// Where the electrodes sit
    #[characteristic(uuid = characteristic::BODY_SENSOR_LOCATION, read, value = BODY_SENSOR_LOCATION)]
    pub body_sensor_location: u8,
}

/// BLE GATT server hosting the measurement service
#[gatt_server(mutex_type = CriticalSectionRawMutex)]
pub struct Server {
    pub emg: MeasurementGattService,
}
