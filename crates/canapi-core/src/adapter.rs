//! Adapter driver abstraction.
//!
//! `Adapter` is the narrow contract to the vendor driver: channel condition,
//! initialize/uninitialize/reset, raw frame read/write, bus status, key/value
//! parameters and receive-event binding. Everything here speaks the adapter's
//! native shapes (`WireMessage`, `BusStatus`); normalization into
//! `CanMessage`/`CanStatus` happens in the frame engine.
//!
//! `MockAdapter` (in `mock.rs`) is the scripted implementation used by tests
//! and by the monitor when no hardware is attached.

use std::sync::Arc;

use async_trait::async_trait;
use bitflags::bitflags;
use thiserror::Error;

use crate::event::ReceiveEvent;
use crate::types::{Board, BoardParams, Timestamp, len_to_dlc};

/// Driver-level view of a channel before it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCondition {
    Available,
    Unavailable,
    Occupied,
    /// Available to be shared with another client.
    Shared,
    /// The driver returned something unexpected.
    Unknown(u32),
}

/// Conditions reported by the adapter driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("transmit buffer full")]
    TransmitFull,
    #[error("controller overrun")]
    Overrun,
    #[error("bus light (error counter reached limit)")]
    BusLight,
    #[error("bus heavy (error counter reached limit)")]
    BusHeavy,
    #[error("bus passive")]
    BusPassive,
    #[error("bus off")]
    BusOff,
    #[error("receive queue empty")]
    ReceiveQueueEmpty,
    #[error("receive queue overrun")]
    ReceiveQueueOverrun,
    #[error("transmit queue full")]
    TransmitQueueFull,
    #[error("register test failed")]
    RegisterTest,
    #[error("driver not loaded")]
    NoDriver,
    #[error("hardware already in use")]
    HardwareInUse,
    #[error("client already connected")]
    NetInUse,
    #[error("illegal hardware handle")]
    IllegalHardware,
    #[error("illegal net handle")]
    IllegalNet,
    #[error("illegal client handle")]
    IllegalClient,
    #[error("resource cannot be created")]
    Resource,
    #[error("illegal parameter type")]
    IllegalParamType,
    #[error("illegal parameter value")]
    IllegalParamValue,
    #[error("illegal data")]
    IllegalData,
    #[error("operation succeeded with caution")]
    Caution,
    #[error("channel not initialized")]
    NotInitialized,
    #[error("illegal operation")]
    IllegalOperation,
    #[error("unknown adapter error 0x{0:X}")]
    Unknown(u32),
}

/// Convenience alias for adapter results.
pub type AdapterResult<T> = Result<T, AdapterError>;

bitflags! {
    /// Bus status word polled from the adapter or carried in a status frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BusStatus: u32 {
        const TRANSMIT_FULL = 0x0000_0001;
        const OVERRUN = 0x0000_0002;
        const BUS_LIGHT = 0x0000_0004;
        const BUS_HEAVY = 0x0000_0008;
        /// Alias of `BUS_HEAVY` on newer drivers.
        const BUS_WARNING = 0x0000_0008;
        const BUS_OFF = 0x0000_0010;
        const QUEUE_RECEIVE_EMPTY = 0x0000_0020;
        const QUEUE_OVERRUN = 0x0000_0040;
        const QUEUE_TRANSMIT_FULL = 0x0000_0080;
        const BUS_PASSIVE = 0x0004_0000;
    }
}

impl BusStatus {
    /// The error this status word stands for, if any. Priority follows the
    /// driver's own precedence of conditions.
    pub fn to_error(self) -> Option<AdapterError> {
        let order = [
            (BusStatus::TRANSMIT_FULL, AdapterError::TransmitFull),
            (BusStatus::OVERRUN, AdapterError::Overrun),
            (BusStatus::BUS_OFF, AdapterError::BusOff),
            (BusStatus::BUS_PASSIVE, AdapterError::BusPassive),
            (BusStatus::BUS_HEAVY, AdapterError::BusHeavy),
            (BusStatus::BUS_LIGHT, AdapterError::BusLight),
            (BusStatus::QUEUE_RECEIVE_EMPTY, AdapterError::ReceiveQueueEmpty),
            (BusStatus::QUEUE_OVERRUN, AdapterError::ReceiveQueueOverrun),
            (BusStatus::QUEUE_TRANSMIT_FULL, AdapterError::TransmitQueueFull),
        ];
        order
            .into_iter()
            .find(|(bit, _)| self.contains(*bit))
            .map(|(_, err)| err)
    }
}

bitflags! {
    /// Adapter message-type byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageType: u8 {
        const RTR = 0x01;
        const EXTENDED = 0x02;
        const FD = 0x04;
        const BRS = 0x08;
        const ESI = 0x10;
        /// Status frame; the bus status word is in data[0..4], big-endian.
        const STATUS = 0x80;
    }
}

impl MessageType {
    pub const STANDARD: MessageType = MessageType::empty();
}

/// Adapter receive timestamp, in the shape each frame format reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTimestamp {
    /// Classic: 32-bit millisecond counter with overflow word plus micros.
    Classic {
        millis: u32,
        millis_overflow: u16,
        micros: u16,
    },
    /// FD: flat microsecond counter.
    Fd(u64),
}

impl Default for WireTimestamp {
    fn default() -> Self {
        WireTimestamp::Fd(0)
    }
}

impl WireTimestamp {
    pub fn from_micros(micros: u64, fd: bool) -> Self {
        if fd {
            return WireTimestamp::Fd(micros);
        }
        let msec = micros / 1000;
        WireTimestamp::Classic {
            millis: msec as u32,
            millis_overflow: (msec >> 32) as u16,
            micros: (micros % 1000) as u16,
        }
    }

    /// Reconstruct the seconds/microseconds timestamp.
    pub fn to_timestamp(self) -> Timestamp {
        let micros = match self {
            WireTimestamp::Classic {
                millis,
                millis_overflow,
                micros,
            } => {
                let msec = (u64::from(millis_overflow) << 32) + u64::from(millis);
                msec * 1000 + u64::from(micros)
            }
            WireTimestamp::Fd(micros) => micros,
        };
        Timestamp {
            sec: micros / 1_000_000,
            usec: (micros % 1_000_000) as u32,
        }
    }
}

/// A frame in the adapter's native shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WireMessage {
    pub id: u32,
    pub msg_type: MessageType,
    /// Data-length code (0..=8 classic, 0..=15 FD).
    pub dlc: u8,
    pub data: Vec<u8>,
    pub timestamp: WireTimestamp,
}

impl WireMessage {
    /// Data frame with the given type flags.
    pub fn new(id: u32, msg_type: MessageType, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            id,
            msg_type,
            dlc: len_to_dlc(data.len()),
            data,
            timestamp: WireTimestamp::default(),
        }
    }

    /// Status frame carrying a bus status word.
    pub fn status(bus: BusStatus) -> Self {
        Self {
            id: 0,
            msg_type: MessageType::STATUS,
            dlc: 4,
            data: bus.bits().to_be_bytes().to_vec(),
            timestamp: WireTimestamp::default(),
        }
    }

    pub fn is_status(&self) -> bool {
        self.msg_type.contains(MessageType::STATUS)
    }

    /// Bus status carried by a status frame (empty for data frames).
    pub fn bus_status(&self) -> BusStatus {
        if !self.is_status() {
            return BusStatus::empty();
        }
        let mut word = [0u8; 4];
        for (dst, src) in word.iter_mut().zip(&self.data) {
            *dst = *src;
        }
        BusStatus::from_bits_truncate(u32::from_be_bytes(word))
    }
}

/// Bit-timing in the form the adapter initializes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitTiming {
    /// Classic controller: packed BTR0BTR1 word.
    Btr0Btr1(u16),
    /// CAN FD controller: `key=value` bit-rate string.
    Fd(String),
}

/// Adapter parameter ids used by the core.
pub mod param {
    pub const DEVICE_NUMBER: u8 = 0x01;
    pub const API_VERSION: u8 = 0x05;
    pub const CHANNEL_VERSION: u8 = 0x06;
    pub const LISTEN_ONLY: u8 = 0x08;

    /// Value of an enabled on/off parameter.
    pub const PARAMETER_ON: u32 = 0x01;
}

/// Vendor CAN driver.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Condition of a channel before it is opened.
    async fn channel_condition(&self, board: Board) -> AdapterResult<ChannelCondition>;

    /// Initialize a channel at the given bit-timing.
    async fn initialize(
        &self,
        board: Board,
        params: &BoardParams,
        timing: &InitTiming,
    ) -> AdapterResult<()>;

    /// Release a channel.
    async fn uninitialize(&self, board: Board) -> AdapterResult<()>;

    /// Reset the controller and clear its queues.
    async fn reset(&self, board: Board) -> AdapterResult<()>;

    /// Non-blocking read. An empty queue is `Err(ReceiveQueueEmpty)`.
    async fn read_frame(&self, board: Board, fd: bool) -> AdapterResult<WireMessage>;

    /// Queue a frame for transmission.
    async fn write_frame(&self, board: Board, fd: bool, msg: &WireMessage) -> AdapterResult<()>;

    /// Current bus status word.
    async fn bus_status(&self, board: Board) -> AdapterResult<BusStatus>;

    /// Read a parameter.
    async fn get_value(&self, board: Board, id: u8) -> AdapterResult<Vec<u8>>;

    /// Write a parameter.
    async fn set_value(&self, board: Board, id: u8, value: &[u8]) -> AdapterResult<()>;

    /// Have the driver signal `event` whenever a frame is received.
    async fn bind_receive_event(&self, board: Board, event: Arc<ReceiveEvent>)
    -> AdapterResult<()>;
}
