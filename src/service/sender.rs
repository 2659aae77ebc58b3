//! Measurement notification delivery
//!
//! A send is only attempted while a link is up. Transient transport
//! congestion (busy, out of buffers) is absorbed here by waiting and trying
//! again; everything else goes straight back to the caller.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use super::{MeasurementService, ServiceError};
use crate::config::retry::BUSY_RETRY_DELAY_MS;
use crate::gatt::GattTransport;

/// How long to wait between attempts and when to give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between attempts in milliseconds
    pub delay_ms: u32,
    /// Retries allowed after the first attempt, `None` retries until the
    /// transport stops reporting congestion
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever with the default delay
    pub const fn unbounded() -> Self {
        Self {
            delay_ms: BUSY_RETRY_DELAY_MS,
            max_retries: None,
        }
    }

    /// Give up after `max_retries` retries
    pub const fn bounded(max_retries: u32) -> Self {
        Self {
            delay_ms: BUSY_RETRY_DELAY_MS,
            max_retries: Some(max_retries),
        }
    }

    fn exhausted(&self, retries: u32) -> bool {
        self.max_retries.is_some_and(|max| retries >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<M: RawMutex, H> MeasurementService<M, H> {
    /// Notify `payload` on the measurement characteristic.
    ///
    /// Fails with [`ServiceError::InvalidState`] without touching the
    /// transport while disconnected. Whether the peer subscribed is not
    /// checked; use the subscription callback for that.
    ///
    /// The connection id is captured once, so a disconnect during the retry
    /// loop does not end it. Only a non-transient transport error, success,
    /// or an exhausted [`RetryPolicy`] does.
    pub async fn send<T: GattTransport, D: DelayNs>(
        &self,
        transport: &mut T,
        delay: &mut D,
        payload: &[u8],
    ) -> Result<(), ServiceError> {
        let Some(conn) = self.connection() else {
            return Err(ServiceError::InvalidState);
        };
        let value_handle = self.measurement_handles.value_handle;

        let mut retries: u32 = 0;
        let result = loop {
            match transport.notify(conn, value_handle, payload).await {
                Err(error) if error.is_transient() && !self.retry.exhausted(retries) => {
                    retries = retries.saturating_add(1);
                    delay.delay_ms(self.retry.delay_ms).await;
                }
                result => break result,
            }
        };

        match result {
            Ok(()) => info!(
                "Measurement sent: {} bytes, conn={}, retries={}",
                payload.len(),
                conn.0,
                retries
            ),
            Err(error) => warn!(
                "Measurement send failed: {:?}, conn={}, retries={}",
                error, conn.0, retries
            ),
        }

        result.map_err(ServiceError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::traits::mock::{MockDelay, MockGattTransport};
    use crate::gatt::{BleEvent, ConnectionId, TransportError};
    use crate::service::ServiceConfig;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    /// Delay that drops the link every time the sender backs off
    struct DisconnectingDelay<'a> {
        service: &'a MeasurementService<NoopRawMutex>,
        conn: ConnectionId,
        cycles: u32,
    }

    impl DelayNs for DisconnectingDelay<'_> {
        async fn delay_ns(&mut self, _ns: u32) {
            self.cycles += 1;
            self.service.on_ble_event(&BleEvent::Disconnected {
                conn: self.conn,
                reason: 0x13,
            });
        }
    }

    fn connected_service(
        transport: &mut MockGattTransport,
        retry: RetryPolicy,
        conn: ConnectionId,
    ) -> MeasurementService<NoopRawMutex> {
        let config = ServiceConfig {
            retry,
            ..ServiceConfig::new()
        };
        let service = MeasurementService::init(config, transport).unwrap();
        service.on_ble_event(&BleEvent::Connected { conn });
        service
    }

    #[test]
    fn test_send_while_disconnected() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service: MeasurementService<NoopRawMutex> =
            MeasurementService::init(ServiceConfig::new(), &mut transport).unwrap();

        futures::executor::block_on(async {
            let result = service.send(&mut transport, &mut delay, &[0x00, 0x48]).await;
            assert_eq!(result, Err(ServiceError::InvalidState));
            assert_eq!(transport.notify_attempts(), 0);
            assert_eq!(delay.cycles, 0);
        });
    }

    #[test]
    fn test_send_uses_connection_and_value_handle() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(0x2A));

        futures::executor::block_on(async {
            service
                .send(&mut transport, &mut delay, &[0x00, 0x48])
                .await
                .unwrap();

            let sent = transport.get_sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].conn, ConnectionId(0x2A));
            assert_eq!(sent[0].value_handle, service.handles().value_handle);
        });
    }

    #[test]
    fn test_busy_twice_then_success() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(1));

        futures::executor::block_on(async {
            transport.queue_notify_result(Err(TransportError::Busy));
            transport.queue_notify_result(Err(TransportError::Busy));

            let payload = [0x10, 0x4B, 0x00, 0x04];
            service
                .send(&mut transport, &mut delay, &payload)
                .await
                .unwrap();

            assert_eq!(delay.cycles, 2);
            assert_eq!(delay.total_ms, 2 * BUSY_RETRY_DELAY_MS);
            assert_eq!(transport.notify_attempts(), 3);

            let sent = transport.get_sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].payload.as_slice(), &payload);
        });
    }

    #[test]
    fn test_resources_exhausted_is_retried() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(1));

        futures::executor::block_on(async {
            transport.queue_notify_result(Err(TransportError::Resources));
            transport.queue_notify_result(Err(TransportError::Busy));
            transport.queue_notify_result(Err(TransportError::Resources));

            service
                .send(&mut transport, &mut delay, &[0x00, 0x50])
                .await
                .unwrap();
            assert_eq!(delay.cycles, 3);
            assert_eq!(transport.get_sent().len(), 1);
        });
    }

    #[test]
    fn test_hard_error_returned_verbatim() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(1));

        futures::executor::block_on(async {
            transport.queue_notify_result(Err(TransportError::Busy));
            transport.queue_notify_result(Err(TransportError::Other(0x3401)));

            let result = service.send(&mut transport, &mut delay, &[0x00, 0x50]).await;
            assert_eq!(
                result,
                Err(ServiceError::Transport(TransportError::Other(0x3401)))
            );
            assert_eq!(delay.cycles, 1);
            assert!(transport.get_sent().is_empty());

            // The dropped payload is not resent on the next call
            service
                .send(&mut transport, &mut delay, &[0x00, 0x51])
                .await
                .unwrap();
            let sent = transport.get_sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].payload.as_slice(), &[0x00, 0x51]);
        });
    }

    #[test]
    fn test_transport_invalid_state_not_retried() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(1));

        futures::executor::block_on(async {
            transport.queue_notify_result(Err(TransportError::InvalidState));

            let result = service.send(&mut transport, &mut delay, &[0x00, 0x50]).await;
            assert_eq!(
                result,
                Err(ServiceError::Transport(TransportError::InvalidState))
            );
            assert_eq!(delay.cycles, 0);
            assert_eq!(transport.notify_attempts(), 1);
        });
    }

    #[test]
    fn test_bounded_retry_gives_up() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::bounded(3), ConnectionId(1));

        futures::executor::block_on(async {
            transport.set_persistent_error(Some(TransportError::Busy));

            let result = service.send(&mut transport, &mut delay, &[0x00, 0x50]).await;
            assert_eq!(result, Err(ServiceError::Transport(TransportError::Busy)));
            assert_eq!(delay.cycles, 3);
            assert_eq!(transport.notify_attempts(), 4);
        });
    }

    #[test]
    fn test_disconnect_during_retry_keeps_captured_connection() {
        let mut transport = MockGattTransport::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(5));
        let mut delay = DisconnectingDelay {
            service: &service,
            conn: ConnectionId(5),
            cycles: 0,
        };

        futures::executor::block_on(async {
            transport.queue_notify_result(Err(TransportError::Busy));
            transport.queue_notify_result(Err(TransportError::Busy));

            let result = service.send(&mut transport, &mut delay, &[0x01, 0x02]).await;
            assert_eq!(result, Ok(()));
            assert_eq!(delay.cycles, 2);
            assert_eq!(service.connection(), None);

            let sent = transport.get_sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].conn, ConnectionId(5));
            assert_eq!(sent[0].value_handle, service.handles().value_handle);
            assert_eq!(sent[0].payload.as_slice(), &[0x01, 0x02]);
        });
    }

    #[test]
    fn test_retry_count_never_exhausts_unbounded_policy() {
        let retries = u32::MAX.saturating_add(1);
        assert_eq!(retries, u32::MAX);
        assert!(!RetryPolicy::unbounded().exhausted(retries));
        assert!(RetryPolicy::bounded(u32::MAX).exhausted(retries));
    }

    #[test]
    fn test_custom_retry_delay() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let retry = RetryPolicy {
            delay_ms: 7,
            max_retries: None,
        };
        let service = connected_service(&mut transport, retry, ConnectionId(1));

        futures::executor::block_on(async {
            transport.queue_notify_result(Err(TransportError::Busy));

            service
                .send(&mut transport, &mut delay, &[0x00, 0x50])
                .await
                .unwrap();
            assert_eq!(delay.total_ms, 7);
        });
    }

    #[test]
    fn test_send_does_not_require_subscription() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(1));
        let cccd = service.handles().cccd_handle.unwrap();

        futures::executor::block_on(async {
            // Peer explicitly disabled notifications; send still goes out
            service.on_ble_event(&BleEvent::Write {
                conn: ConnectionId(1),
                handle: cccd,
                data: &[0x00, 0x00],
            });
            service
                .send(&mut transport, &mut delay, &[0x00, 0x50])
                .await
                .unwrap();
            assert_eq!(transport.get_sent().len(), 1);
        });
    }

    #[test]
    fn test_oversized_payload_rejected_by_transport() {
        let mut transport = MockGattTransport::new();
        let mut delay = MockDelay::new();
        let service = connected_service(&mut transport, RetryPolicy::default(), ConnectionId(1));

        futures::executor::block_on(async {
            let payload = [0u8; 129];
            let result = service.send(&mut transport, &mut delay, &payload).await;
            assert_eq!(result, Err(ServiceError::Transport(TransportError::DataSize)));
            assert_eq!(delay.cycles, 0);
        });
    }
}
