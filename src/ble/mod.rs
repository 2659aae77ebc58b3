//! Bluetooth Low Energy module
//!
//! Binds the measurement service to the trouble-host stack: the static GATT
//! table and a transport that hands notifications to the BLE host task.

pub mod server;
pub mod transport;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::service::MeasurementService;

pub use server::{MeasurementGattService, Server};
pub use transport::{ChannelTransport, NotifyRequest, NOTIFY_REQUESTS, NOTIFY_RESULT};

/// Measurement service shared between the BLE host task and the sampler
pub type SharedService = MeasurementService<CriticalSectionRawMutex>;
