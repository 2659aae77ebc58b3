//! GATT transport trait for abstraction and testability
//!
//! This trait defines the small slice of the BLE host stack the measurement
//! service relies on, allowing the trouble-host binding to be swapped with a
//! mock for testing.

use core::future::Future;

/// Identifier of an established link, as assigned by the host stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u16);

/// Errors reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Transmit path momentarily busy
    Busy,
    /// Transmit buffers exhausted
    Resources,
    /// Operation not valid in the current link state
    InvalidState,
    /// Rejected parameter (handle, uuid, length)
    InvalidParam,
    /// Unknown connection or attribute
    NotFound,
    /// Payload longer than the attribute or link allows
    DataSize,
    /// Stack-specific error code
    Other(u32),
}

impl TransportError {
    /// True for congestion that is expected to clear on its own
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Busy | TransportError::Resources)
    }
}

/// Link security needed to access an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityReq {
    /// Access forbidden
    NoAccess,
    /// No security required
    #[default]
    Open,
    /// Encrypted link, unauthenticated pairing
    EncNoMitm,
    /// Encrypted link, authenticated pairing
    EncWithMitm,
    /// Encrypted link, LE Secure Connections with authenticated pairing
    LescEncWithMitm,
}

/// Characteristic properties the service requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProps {
    pub read: bool,
    pub notify: bool,
}

/// Everything the transport needs to register one characteristic
#[derive(Debug, Clone, Copy)]
pub struct CharacteristicParams<'a> {
    /// 16-bit characteristic UUID
    pub uuid: u16,
    /// Maximum value length in bytes
    pub max_len: u16,
    /// Whether the value length may vary up to `max_len`
    pub variable_len: bool,
    pub props: CharacteristicProps,
    /// Initial value (may be empty)
    pub initial_value: &'a [u8],
    /// Security for reading the value
    pub read_access: SecurityReq,
    /// Security for writing the CCCD (ignored without notify)
    pub cccd_write_access: SecurityReq,
}

/// Handles assigned to a registered characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicHandles {
    /// Value attribute handle
    pub value_handle: u16,
    /// Client configuration descriptor, present for notifiable characteristics
    pub cccd_handle: Option<u16>,
}

/// Abstract GATT server transport
///
/// Registration happens once at boot and is synchronous. Notification
/// delivery is async since the real stack may have to hand the payload to a
/// different task that owns the connection.
pub trait GattTransport {
    /// Register a primary service, returning its handle
    fn register_service(&mut self, uuid: u16) -> Result<u16, TransportError>;

    /// Register a characteristic inside `service`
    fn register_characteristic(
        &mut self,
        service: u16,
        params: &CharacteristicParams<'_>,
    ) -> Result<CharacteristicHandles, TransportError>;

    /// Send a handle value notification on `conn`
    fn notify(
        &mut self,
        conn: ConnectionId,
        value_handle: u16,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>>;
}
