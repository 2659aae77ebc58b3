//! Transport events delivered to the measurement service

use crate::config::cccd;
use crate::gatt::traits::ConnectionId;

/// One event from the BLE host stack
///
/// Many services typically share one event feed, so a receiver must filter
/// by its own handles before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleEvent<'a> {
    /// A central connected
    Connected { conn: ConnectionId },
    /// The link was lost or closed
    Disconnected { conn: ConnectionId, reason: u8 },
    /// A peer wrote an attribute
    Write {
        conn: ConnectionId,
        handle: u16,
        data: &'a [u8],
    },
    /// The effective ATT MTU of a link changed
    MtuUpdated { conn: ConnectionId, att_mtu: u16 },
    /// Anything this layer does not care about
    Other,
}

/// Decode a CCCD write into the notification-enabled bit.
///
/// Returns `None` unless the write is exactly one little-endian u16.
pub fn notifications_enabled(data: &[u8]) -> Option<bool> {
    let value: [u8; cccd::VALUE_LEN] = data.try_into().ok()?;
    Some(u16::from_le_bytes(value) & cccd::NOTIFY != 0)
}

/// Turns polled ATT MTU readings of one link into [`BleEvent::MtuUpdated`]
///
/// The host stack exchanges the MTU on its own, so the BLE task samples the
/// current value after every event it handles.
#[derive(Debug, Clone, Copy)]
pub struct MtuTracker {
    conn: ConnectionId,
    att_mtu: u16,
}

impl MtuTracker {
    pub fn new(conn: ConnectionId, att_mtu: u16) -> Self {
        Self { conn, att_mtu }
    }

    /// Record the current MTU, returning an event only when it changed
    pub fn update(&mut self, att_mtu: u16) -> Option<BleEvent<'static>> {
        if att_mtu == self.att_mtu {
            return None;
        }
        self.att_mtu = att_mtu;
        Some(BleEvent::MtuUpdated {
            conn: self.conn,
            att_mtu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mtu_change_reported_once() {
        let mut tracker = MtuTracker::new(ConnectionId(7), 23);

        assert_eq!(tracker.update(23), None);
        assert_eq!(
            tracker.update(247),
            Some(BleEvent::MtuUpdated {
                conn: ConnectionId(7),
                att_mtu: 247
            })
        );
        // Repeated polls after a notification see no further change
        assert_eq!(tracker.update(247), None);
        assert_eq!(tracker.update(247), None);
    }

    #[test]
    fn test_notify_bit_set() {
        assert_eq!(notifications_enabled(&[0x01, 0x00]), Some(true));
        // Indicate bit alongside notify
        assert_eq!(notifications_enabled(&[0x03, 0x00]), Some(true));
    }

    #[test]
    fn test_notify_bit_clear() {
        assert_eq!(notifications_enabled(&[0x00, 0x00]), Some(false));
        assert_eq!(notifications_enabled(&[0x02, 0x00]), Some(false));
        // Notify bit lives in the low byte only
        assert_eq!(notifications_enabled(&[0x00, 0x01]), Some(false));
    }

    #[test]
    fn test_wrong_length_ignored() {
        assert_eq!(notifications_enabled(&[]), None);
        assert_eq!(notifications_enabled(&[0x01]), None);
        assert_eq!(notifications_enabled(&[0x01, 0x00, 0x00]), None);
    }
}
