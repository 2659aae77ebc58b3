//! Routing of host stack events into the measurement service

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::debug;

use super::{MeasurementEvent, MeasurementEventHandler, MeasurementService};
use crate::config::gatt::ATT_NOTIFY_HEADER_LEN;
use crate::gatt::event::{notifications_enabled, BleEvent};
use crate::gatt::ConnectionId;

impl<M: RawMutex, H: MeasurementEventHandler> MeasurementService<M, H> {
    /// Feed one event from the host stack.
    ///
    /// Must see every event the stack delivers so the connection state stays
    /// consistent. Writes to attributes this service does not own are
    /// ignored. The event handler, if any, runs before this returns.
    pub fn on_ble_event(&self, event: &BleEvent<'_>) {
        match *event {
            BleEvent::Connected { conn } => self.on_connect(conn),
            BleEvent::Disconnected { conn, reason } => self.on_disconnect(conn, reason),
            BleEvent::Write { handle, data, .. } => self.on_write(handle, data),
            BleEvent::MtuUpdated { conn, att_mtu } => self.on_mtu_updated(conn, att_mtu),
            BleEvent::Other => {}
        }
    }

    fn on_connect(&self, conn: ConnectionId) {
        debug!("Measurement service: connected, conn={}", conn.0);
        self.state.lock(|state| state.borrow_mut().conn = Some(conn));
    }

    fn on_disconnect(&self, conn: ConnectionId, reason: u8) {
        debug!(
            "Measurement service: disconnected, conn={} reason={:#04x}",
            conn.0, reason
        );
        // Single link: any disconnect drops it
        self.state.lock(|state| state.borrow_mut().conn = None);
    }

    fn on_write(&self, handle: u16, data: &[u8]) {
        if self.measurement_handles.cccd_handle != Some(handle) {
            return;
        }

        let Some(enabled) = notifications_enabled(data) else {
            return;
        };

        let event = if enabled {
            MeasurementEvent::NotificationEnabled
        } else {
            MeasurementEvent::NotificationDisabled
        };
        debug!("Measurement service: {:?}", event);

        if let Some(handler) = &self.handler {
            handler.on_event(event);
        }
    }

    fn on_mtu_updated(&self, conn: ConnectionId, att_mtu: u16) {
        if self.connection() != Some(conn) {
            return;
        }
        // Payload length stays fixed at registration; only report the new headroom
        debug!(
            "Measurement service: ATT MTU {} allows {} byte notifications",
            att_mtu,
            att_mtu.saturating_sub(ATT_NOTIFY_HEADER_LEN)
        );
    }
}
