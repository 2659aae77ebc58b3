//! BLE task for the measurement service
//!
//! Runs the trouble-host stack, advertises, feeds connection and GATT events
//! into the [`SharedService`] and performs the notifications queued by
//! [`ChannelTransport`](crate::ble::ChannelTransport).

use embassy_futures::select::{select, Either};
use log::{debug, info};
use trouble_host::prelude::*;

use crate::ble::{NotifyRequest, Server, SharedService, NOTIFY_REQUESTS, NOTIFY_RESULT};
use crate::config::ble::{CONNECTIONS_MAX, L2CAP_CHANNELS_MAX};
use crate::gatt::{BleEvent, ConnectionId, MtuTracker, TransportError};

/// Main BLE task that manages the Bluetooth stack and connections
///
/// This task:
/// 1. Starts advertising under `device_name`
/// 2. Reports connects, disconnects, attribute writes and MTU changes to the service
/// 3. Sends queued measurement notifications on the live connection
pub async fn ble_task<C: Controller>(
    controller: C,
    server: &Server<'_>,
    service: &SharedService,
    device_name: &str,
    device_id: [u8; 3],
) {
    info!("BLE: Starting as '{}'", device_name);

    // Create BLE host resources
    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();

    // Build the BLE stack with address derived from device ID
    let stack = trouble_host::new(controller, &mut resources).set_random_address(Address::random([
        device_id[0],
        device_id[1],
        device_id[2],
        0x1E,
        0x83,
        0xE7,
    ]));

    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let runner_task = runner.run();

    let peripheral_task = async {
        let mut adv_data = [0u8; 31];
        let len = match AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::ServiceUuids16(&[[0x0D, 0x18]]),
                AdStructure::CompleteLocalName(device_name.as_bytes()),
            ],
            &mut adv_data,
        ) {
            Ok(l) => l,
            Err(_) => return,
        };

        loop {
            debug!("BLE: Advertising...");
            let advertiser = match peripheral
                .advertise(
                    &Default::default(),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..len],
                        scan_data: &[],
                    },
                )
                .await
            {
                Ok(a) => a,
                Err(_) => continue,
            };

            // Nobody to notify while advertising
            let acceptor = match select(advertiser.accept(), reject_notifications()).await {
                Either::First(Ok(a)) => a,
                Either::First(Err(_)) | Either::Second(()) => continue,
            };

            let conn = match acceptor.with_attribute_server(server) {
                Ok(c) => c,
                Err(_) => continue,
            };

            let conn_id = ConnectionId(conn.raw().handle().raw());
            info!("BLE: Connected, conn={}", conn_id.0);
            service.on_ble_event(&BleEvent::Connected { conn: conn_id });

            let mut mtu = MtuTracker::new(conn_id, conn.raw().att_mtu());

            loop {
                match select(conn.next(), NOTIFY_REQUESTS.receive()).await {
                    Either::First(GattConnectionEvent::Disconnected { reason }) => {
                        info!("BLE: Disconnected, conn={}", conn_id.0);
                        service.on_ble_event(&BleEvent::Disconnected {
                            conn: conn_id,
                            reason: reason.into_inner(),
                        });
                        break;
                    }
                    Either::First(GattConnectionEvent::Gatt { event }) => {
                        if let GattEvent::Write(write) = &event {
                            service.on_ble_event(&BleEvent::Write {
                                conn: conn_id,
                                handle: write.handle(),
                                data: write.data(),
                            });
                        }
                        if let Ok(reply) = event.accept() {
                            reply.send().await;
                        }
                    }
                    Either::First(_) => {}
                    Either::Second(request) => {
                        let result = notify(server, &conn, conn_id, &request).await;
                        NOTIFY_RESULT.signal(result);
                    }
                }

                // trouble exchanges the MTU internally; surface the change
                if let Some(event) = mtu.update(conn.raw().att_mtu()) {
                    service.on_ble_event(&event);
                }
            }

            // Anything queued for the old link can no longer be delivered
            while NOTIFY_REQUESTS.try_receive().is_ok() {
                NOTIFY_RESULT.signal(Err(TransportError::InvalidState));
            }
        }
    };

    select(runner_task, peripheral_task).await;
}

/// Fail every notification request until cancelled
async fn reject_notifications() {
    loop {
        let _ = NOTIFY_REQUESTS.receive().await;
        NOTIFY_RESULT.signal(Err(TransportError::InvalidState));
    }
}

/// Deliver one queued notification on the live connection
async fn notify<P: PacketPool>(
    server: &Server<'_>,
    conn: &GattConnection<'_, '_, P>,
    conn_id: ConnectionId,
    request: &NotifyRequest,
) -> Result<(), TransportError> {
    if request.conn != conn_id {
        return Err(TransportError::InvalidState);
    }
    if request.value_handle != server.emg.measurement.handle {
        return Err(TransportError::NotFound);
    }

    server
        .emg
        .measurement
        .notify(conn, &request.payload)
        .await
        .map_err(map_host_error)
}

/// Sort host stack errors into transient and hard failures
fn map_host_error(error: trouble_host::Error) -> TransportError {
    use trouble_host::Error;

    match error {
        Error::Busy => TransportError::Busy,
        Error::OutOfMemory => TransportError::Resources,
        Error::Disconnected => TransportError::InvalidState,
        Error::NotFound => TransportError::NotFound,
        Error::InsufficientSpace => TransportError::DataSize,
        _ => TransportError::Other(0),
    }
}
