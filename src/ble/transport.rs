//! GattTransport implementation backed by the trouble-host GATT server
//!
//! The attribute table is built at compile time by the `gatt_server` macro,
//! so registration here resolves the requested service and characteristics
//! against that table. Notifications need the live connection, which only
//! the BLE host task owns; they are queued on [`NOTIFY_REQUESTS`] and the
//! host task reports the outcome on [`NOTIFY_RESULT`]. A full queue shows up
//! as [`TransportError::Busy`], which the service's retry loop absorbs.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::warn;

use crate::ble::server::Server;
use crate::config::ble::NOTIFY_QUEUE_DEPTH;
use crate::config::gatt;
use crate::gatt::{
    CharacteristicHandles, CharacteristicParams, ConnectionId, GattTransport, SecurityReq,
    TransportError,
};
use crate::measurement::MeasurementPayload;

/// A notification waiting for the BLE host task
#[derive(Debug, Clone)]
pub struct NotifyRequest {
    pub conn: ConnectionId,
    pub value_handle: u16,
    pub payload: MeasurementPayload,
}

/// Notifications queued for the BLE host task
pub static NOTIFY_REQUESTS: Channel<CriticalSectionRawMutex, NotifyRequest, NOTIFY_QUEUE_DEPTH> =
    Channel::new();

/// Outcome of the most recent notification
pub static NOTIFY_RESULT: Signal<CriticalSectionRawMutex, Result<(), TransportError>> =
    Signal::new();

/// Transport handed to [`MeasurementService`](crate::service::MeasurementService)
pub struct ChannelTransport<'a> {
    server: &'a Server<'a>,
}

impl<'a> ChannelTransport<'a> {
    pub fn new(server: &'a Server<'a>) -> Self {
        Self { server }
    }

    fn measurement_handles(&self) -> CharacteristicHandles {
        CharacteristicHandles {
            value_handle: self.server.emg.measurement.handle,
            cccd_handle: self.server.emg.measurement.cccd_handle,
        }
    }

    fn body_sensor_location_handles(&self) -> CharacteristicHandles {
        CharacteristicHandles {
            value_handle: self.server.emg.body_sensor_location.handle,
            cccd_handle: None,
        }
    }
}

/// The static table carries no per-attribute permissions
fn check_security(uuid: u16, requirement: SecurityReq) {
    if !matches!(requirement, SecurityReq::Open) {
        warn!(
            "GATT: {:?} requested for {:#06x}, link security is not enforced per attribute",
            requirement, uuid
        );
    }
}

impl<'a> GattTransport for ChannelTransport<'a> {
    fn register_service(&mut self, uuid: u16) -> Result<u16, TransportError> {
        if uuid != gatt::SERVICE_UUID {
            return Err(TransportError::NotFound);
        }
        Ok(self.server.emg.handle)
    }

    fn register_characteristic(
        &mut self,
        service: u16,
        params: &CharacteristicParams<'_>,
    ) -> Result<CharacteristicHandles, TransportError> {
        if service != self.server.emg.handle {
            return Err(TransportError::NotFound);
        }

        match params.uuid {
            gatt::MEASUREMENT_UUID => {
                if usize::from(params.max_len) > gatt::MAX_MEASUREMENT_LEN || !params.props.notify {
                    return Err(TransportError::InvalidParam);
                }
                check_security(params.uuid, params.cccd_write_access);
                Ok(self.measurement_handles())
            }
            gatt::BODY_SENSOR_LOCATION_UUID => {
                let &[location] = params.initial_value else {
                    return Err(TransportError::DataSize);
                };
                check_security(params.uuid, params.read_access);
                self.server
                    .set(&self.server.emg.body_sensor_location, &location)
                    .map_err(|_| TransportError::InvalidParam)?;
                Ok(self.body_sensor_location_handles())
            }
            _ => Err(TransportError::NotFound),
        }
    }

    async fn notify(
        &mut self,
        conn: ConnectionId,
        value_handle: u16,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut copy = MeasurementPayload::new();
        copy.extend_from_slice(payload)
            .map_err(|_| TransportError::DataSize)?;

        NOTIFY_RESULT.reset();
        NOTIFY_REQUESTS
            .try_send(NotifyRequest {
                conn,
                value_handle,
                payload: copy,
            })
            .map_err(|_| TransportError::Busy)?;

        NOTIFY_RESULT.wait().await
    }
}
