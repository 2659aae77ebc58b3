//! Configuration constants for the EMG sensor measurement service

/// GATT layout of the measurement service
pub mod gatt {
    /// Heart Rate service UUID, reused by the EMG sensor family
    pub const SERVICE_UUID: u16 = 0x180D;

    /// Measurement characteristic UUID (notify only)
    pub const MEASUREMENT_UUID: u16 = 0x2A37;

    /// Body Sensor Location characteristic UUID (read only)
    pub const BODY_SENSOR_LOCATION_UUID: u16 = 0x2A38;

    /// Maximum length of a measurement notification payload
    pub const MAX_MEASUREMENT_LEN: usize = 128;

    /// ATT opcode (1 byte) plus attribute handle (2 bytes)
    pub const ATT_NOTIFY_HEADER_LEN: u16 = 3;
}

/// Client characteristic configuration descriptor values
pub mod cccd {
    /// A CCCD write is exactly one little-endian u16
    pub const VALUE_LEN: usize = 2;

    /// Notifications enabled
    pub const NOTIFY: u16 = 0x0001;
}

/// Notification back-pressure handling
pub mod retry {
    /// Wait between attempts while the transport reports busy / out of resources
    pub const BUSY_RETRY_DELAY_MS: u32 = 100;
}

/// BLE host configuration (embedded target)
pub mod ble {
    /// Advertised device name
    pub const DEVICE_NAME: &str = "EMG-Sensor";

    /// Number of maximum concurrent connections
    pub const CONNECTIONS_MAX: usize = 1;

    /// Number of L2CAP channels
    pub const L2CAP_CHANNELS_MAX: usize = 2;

    /// Pending notification requests before the sender sees back-pressure
    pub const NOTIFY_QUEUE_DEPTH: usize = 2;
}

/// Measurement sampling (embedded target)
pub mod sampling {
    /// Interval between measurement notifications
    pub const INTERVAL_MS: u64 = 1000;

    /// Body sensor location advertised at startup (0x02 = wrist)
    pub const BODY_SENSOR_LOCATION: u8 = 0x02;
}
