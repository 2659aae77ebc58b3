//! GATT transport abstraction
//!
//! The measurement service only ever talks to the BLE host stack through
//! these types, so it can be exercised on the host against a mock.

pub mod event;
pub mod traits;

pub use event::{BleEvent, MtuTracker};
pub use traits::{
    CharacteristicHandles, CharacteristicParams, CharacteristicProps, ConnectionId, GattTransport,
    SecurityReq, TransportError,
};
