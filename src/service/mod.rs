//! Measurement notification service
//!
//! Owns the link state of the one measurement characteristic, turns host
//! stack events into state transitions and subscription callbacks, and
//! pushes measurement notifications through a [`GattTransport`].
//!
//! Link state lives behind a blocking mutex so the BLE host task (feeding
//! events) and the sampling task (calling [`MeasurementService::send`]) may run
//! on different execution contexts.

pub mod dispatcher;
pub mod sender;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use log::info;

use crate::config::gatt;
use crate::gatt::{
    CharacteristicHandles, CharacteristicParams, CharacteristicProps, ConnectionId, GattTransport,
    SecurityReq, TransportError,
};
use crate::measurement::{self, Capabilities, Measurement, MeasurementPayload};

pub use sender::RetryPolicy;

/// Errors returned to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// Not valid in the current link state (retry later)
    InvalidState,
    /// Non-transient transport failure, passed through unchanged
    Transport(TransportError),
}

impl From<TransportError> for ServiceError {
    fn from(error: TransportError) -> Self {
        ServiceError::Transport(error)
    }
}

/// Subscription changes reported to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementEvent {
    /// Peer enabled measurement notifications
    NotificationEnabled,
    /// Peer disabled measurement notifications
    NotificationDisabled,
}

/// Receives [`MeasurementEvent`]s synchronously from the event feed
pub trait MeasurementEventHandler {
    fn on_event(&self, event: MeasurementEvent);
}

impl<F: Fn(MeasurementEvent)> MeasurementEventHandler for F {
    fn on_event(&self, event: MeasurementEvent) {
        self(event)
    }
}

/// Handler type for services configured without one
pub type NoHandler = fn(MeasurementEvent);

/// Options for [`MeasurementService::init`]
#[derive(Debug, Clone)]
pub struct ServiceConfig<H = NoHandler> {
    /// Initial value of the sensor contact capability
    pub sensor_contact_supported: bool,
    /// Security needed to write the measurement CCCD
    pub measurement_cccd_write: SecurityReq,
    /// Registers a Body Sensor Location characteristic with this value
    pub body_sensor_location: Option<u8>,
    /// Security needed to read the Body Sensor Location
    pub body_sensor_location_read: SecurityReq,
    /// Subscription callback
    pub event_handler: Option<H>,
    /// Back-pressure handling for [`MeasurementService::send`]
    pub retry: RetryPolicy,
}

impl ServiceConfig<NoHandler> {
    pub fn new() -> Self {
        Self {
            sensor_contact_supported: false,
            measurement_cccd_write: SecurityReq::Open,
            body_sensor_location: None,
            body_sensor_location_read: SecurityReq::Open,
            event_handler: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for ServiceConfig<NoHandler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ServiceConfig<H> {
    /// Swap in a subscription callback
    pub fn with_event_handler<H2: MeasurementEventHandler>(self, handler: H2) -> ServiceConfig<H2> {
        ServiceConfig {
            sensor_contact_supported: self.sensor_contact_supported,
            measurement_cccd_write: self.measurement_cccd_write,
            body_sensor_location: self.body_sensor_location,
            body_sensor_location_read: self.body_sensor_location_read,
            event_handler: Some(handler),
            retry: self.retry,
        }
    }
}

/// Mutable part of the service
#[derive(Debug, Clone, Copy, Default)]
struct LinkState {
    /// Active link, `None` while disconnected
    conn: Option<ConnectionId>,
    sensor_contact_supported: bool,
    sensor_contact_detected: bool,
}

/// The measurement service instance
///
/// Created once at boot with [`MeasurementService::init`] and kept for the
/// lifetime of the firmware.
pub struct MeasurementService<M: RawMutex, H = NoHandler> {
    service_handle: u16,
    measurement_handles: CharacteristicHandles,
    body_sensor_location_handles: Option<CharacteristicHandles>,
    handler: Option<H>,
    retry: RetryPolicy,
    state: Mutex<M, RefCell<LinkState>>,
}

impl<M: RawMutex, H: MeasurementEventHandler> MeasurementService<M, H> {
    /// Register the service and its characteristics with the transport.
    ///
    /// Registration errors are returned as reported by the transport; a
    /// failure here is fatal to startup.
    pub fn init<T: GattTransport>(
        config: ServiceConfig<H>,
        transport: &mut T,
    ) -> Result<Self, TransportError> {
        let service_handle = transport.register_service(gatt::SERVICE_UUID)?;

        let measurement_handles = transport.register_characteristic(
            service_handle,
            &CharacteristicParams {
                uuid: gatt::MEASUREMENT_UUID,
                max_len: gatt::MAX_MEASUREMENT_LEN as u16,
                variable_len: true,
                props: CharacteristicProps {
                    read: false,
                    notify: true,
                },
                initial_value: &[],
                read_access: SecurityReq::NoAccess,
                cccd_write_access: config.measurement_cccd_write,
            },
        )?;

        let body_sensor_location_handles = match config.body_sensor_location {
            Some(location) => Some(transport.register_characteristic(
                service_handle,
                &CharacteristicParams {
                    uuid: gatt::BODY_SENSOR_LOCATION_UUID,
                    max_len: 1,
                    variable_len: false,
                    props: CharacteristicProps {
                        read: true,
                        notify: false,
                    },
                    initial_value: &[location],
                    read_access: config.body_sensor_location_read,
                    cccd_write_access: SecurityReq::NoAccess,
                },
            )?),
            None => None,
        };

        info!(
            "Measurement service registered: service={} value={} cccd={:?}",
            service_handle, measurement_handles.value_handle, measurement_handles.cccd_handle
        );

        Ok(Self {
            service_handle,
            measurement_handles,
            body_sensor_location_handles,
            handler: config.event_handler,
            retry: config.retry,
            state: Mutex::new(RefCell::new(LinkState {
                conn: None,
                sensor_contact_supported: config.sensor_contact_supported,
                sensor_contact_detected: false,
            })),
        })
    }
}

impl<M: RawMutex, H> MeasurementService<M, H> {
    /// Handle of the primary service
    pub fn service_handle(&self) -> u16 {
        self.service_handle
    }

    /// Handles of the measurement characteristic
    pub fn handles(&self) -> CharacteristicHandles {
        self.measurement_handles
    }

    /// Handles of the Body Sensor Location characteristic, if registered
    pub fn body_sensor_location_handles(&self) -> Option<CharacteristicHandles> {
        self.body_sensor_location_handles
    }

    /// Active link, `None` while disconnected
    pub fn connection(&self) -> Option<ConnectionId> {
        self.state.lock(|state| state.borrow().conn)
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    pub fn sensor_contact_supported(&self) -> bool {
        self.state.lock(|state| state.borrow().sensor_contact_supported)
    }

    /// Change the sensor contact capability.
    ///
    /// The capability is advertised in every measurement's flag byte and must
    /// stay stable for a session, so this fails with
    /// [`ServiceError::InvalidState`] while a peer is connected.
    pub fn set_sensor_contact_supported(&self, supported: bool) -> Result<(), ServiceError> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.conn.is_some() {
                return Err(ServiceError::InvalidState);
            }
            state.sensor_contact_supported = supported;
            Ok(())
        })
    }

    /// Record whether the sensor currently touches skin
    pub fn set_sensor_contact_detected(&self, detected: bool) {
        self.state
            .lock(|state| state.borrow_mut().sensor_contact_detected = detected);
    }

    /// Current capability bits
    pub fn capabilities(&self) -> Capabilities {
        self.state.lock(|state| {
            let state = state.borrow();
            Capabilities {
                sensor_contact_supported: state.sensor_contact_supported,
                sensor_contact_detected: state.sensor_contact_detected,
            }
        })
    }

    /// Encode a measurement with the service's current capability bits
    pub fn encode_measurement(&self, measurement: &Measurement<'_>) -> MeasurementPayload {
        measurement::encode(measurement, self.capabilities())
    }
}
