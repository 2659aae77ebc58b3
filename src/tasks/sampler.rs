//! Sampler task producing measurement notifications
//!
//! Encodes one measurement per sampling interval and pushes it through the
//! measurement service while a central is connected.

use embassy_time::{Delay, Duration, Ticker};
use log::warn;

use crate::ble::{ChannelTransport, SharedService};
use crate::config::sampling::INTERVAL_MS;
use crate::measurement::Measurement;
use crate::service::ServiceError;

/// Lowest and highest value of the test signal
const SIGNAL_RANGE: (u16, u16) = (40, 180);

/// Task that samples and notifies at a fixed interval
pub async fn sampler_task(service: &SharedService, mut transport: ChannelTransport<'_>) {
    let mut ticker = Ticker::every(Duration::from_millis(INTERVAL_MS));
    let mut delay = Delay;
    let mut value = SIGNAL_RANGE.0;

    loop {
        ticker.next().await;

        // Sawtooth test signal standing in for the EMG front end
        value = if value >= SIGNAL_RANGE.1 {
            SIGNAL_RANGE.0
        } else {
            value + 1
        };

        if !service.is_connected() {
            continue;
        }

        let payload = service.encode_measurement(&Measurement {
            value,
            ..Default::default()
        });

        match service.send(&mut transport, &mut delay, &payload).await {
            Ok(()) => {}
            // Link dropped between the check and the send
            Err(ServiceError::InvalidState) => {}
            Err(error) => warn!("Sampler: measurement dropped: {:?}", error),
        }
    }
}
