//! CAN interface error types.

use canapi_btr::BtrError;
use thiserror::Error;

use crate::adapter::AdapterError;

/// Errors returned by the channel table and the driver facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanError {
    #[error("interface not initialized")]
    NotInitialized,

    #[error("invalid handle")]
    HandleInvalid,

    #[error("interface already opened")]
    AlreadyOpen,

    #[error("controller already started")]
    AlreadyOnline,

    #[error("controller is stopped")]
    Offline,

    #[error("null parameter")]
    NullParameter,

    #[error("invalid data length {len} (max {max})")]
    InvalidLength { len: usize, max: usize },

    #[error("invalid baudrate: {0}")]
    InvalidBaudrate(#[from] BtrError),

    #[error("transmitter busy")]
    TransmitBusy,

    #[error("receiver empty")]
    ReceiveEmpty,

    #[error("no free channel slot")]
    ResourceBusy,

    #[error("receive wait failed")]
    Fatal,

    #[error("bus off")]
    BusOff,

    #[error("error warning level")]
    ErrorWarning,

    #[error("bus error")]
    BusError,

    #[error("message lost")]
    MessageLost,

    #[error("adapter error: {0}")]
    Adapter(AdapterError),
}

impl CanError {
    /// Conditions a caller is expected to simply retry on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CanError::TransmitBusy | CanError::ReceiveEmpty)
    }

    /// Bus-condition errors that do not invalidate the channel.
    pub fn is_bus_condition(&self) -> bool {
        matches!(
            self,
            CanError::BusOff | CanError::ErrorWarning | CanError::BusError | CanError::MessageLost
        )
    }
}

impl From<AdapterError> for CanError {
    fn from(err: AdapterError) -> Self {
        map_adapter_error(err)
    }
}

/// Fold a driver-reported condition into the CAN error taxonomy.
pub fn map_adapter_error(err: AdapterError) -> CanError {
    match err {
        AdapterError::TransmitFull => CanError::TransmitBusy,
        AdapterError::Overrun => CanError::MessageLost,
        AdapterError::BusOff => CanError::BusOff,
        AdapterError::BusPassive => CanError::ErrorWarning,
        AdapterError::BusHeavy | AdapterError::BusLight => CanError::BusError,
        AdapterError::ReceiveQueueEmpty => CanError::ReceiveEmpty,
        AdapterError::ReceiveQueueOverrun => CanError::MessageLost,
        AdapterError::TransmitQueueFull => CanError::TransmitBusy,
        AdapterError::NotInitialized => CanError::NotInitialized,
        other => CanError::Adapter(other),
    }
}

/// Convenience alias for CAN interface results.
pub type CanResult<T> = Result<T, CanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_map_to_taxonomy() {
        assert_eq!(map_adapter_error(AdapterError::TransmitFull), CanError::TransmitBusy);
        assert_eq!(
            map_adapter_error(AdapterError::TransmitQueueFull),
            CanError::TransmitBusy
        );
        assert_eq!(map_adapter_error(AdapterError::Overrun), CanError::MessageLost);
        assert_eq!(
            map_adapter_error(AdapterError::ReceiveQueueOverrun),
            CanError::MessageLost
        );
        assert_eq!(map_adapter_error(AdapterError::BusOff), CanError::BusOff);
        assert_eq!(map_adapter_error(AdapterError::BusPassive), CanError::ErrorWarning);
        assert_eq!(map_adapter_error(AdapterError::BusHeavy), CanError::BusError);
        assert_eq!(map_adapter_error(AdapterError::BusLight), CanError::BusError);
        assert_eq!(
            map_adapter_error(AdapterError::ReceiveQueueEmpty),
            CanError::ReceiveEmpty
        );
        assert_eq!(
            map_adapter_error(AdapterError::NotInitialized),
            CanError::NotInitialized
        );
    }

    #[test]
    fn unmapped_conditions_pass_through() {
        assert_eq!(
            CanError::from(AdapterError::IllegalHardware),
            CanError::Adapter(AdapterError::IllegalHardware)
        );
        assert_eq!(
            CanError::from(AdapterError::Unknown(0x1234)),
            CanError::Adapter(AdapterError::Unknown(0x1234))
        );
    }

    #[test]
    fn bit_timing_errors_are_invalid_baudrate() {
        let err: CanError = BtrError::UnknownIndex(3).into();
        assert!(matches!(err, CanError::InvalidBaudrate(_)));
        assert!(err.to_string().starts_with("invalid baudrate"));
    }

    #[test]
    fn retryable_classification() {
        assert!(CanError::TransmitBusy.is_retryable());
        assert!(CanError::ReceiveEmpty.is_retryable());
        assert!(!CanError::Offline.is_retryable());
        assert!(CanError::BusOff.is_bus_condition());
        assert!(!CanError::Fatal.is_bus_condition());
    }
}
