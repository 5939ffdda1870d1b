//! Vendor-neutral CAN interface layer.
//!
//! Multiplexes a fixed-size table of logical channel handles onto an
//! [`Adapter`] (the vendor driver), and normalizes frames and controller
//! status independent of the adapter's wire format:
//! - `ChannelTable`: slot arena plus lifecycle (probe/open/start/stop/close/kill)
//! - frame I/O: `write` and timed `read` with sticky status updates
//! - status accessor: status, bus-load, bit-rate, properties, versions
//! - `Driver`: per-instance facade with tx/rx/error counters
//! - `MockAdapter`: scripted adapter for tests and hardware-less runs

pub mod adapter;
pub mod driver;
pub mod error;
pub mod event;
pub mod io;
pub mod lifecycle;
pub mod mock;
pub mod status;
pub mod table;
pub mod types;

// Re-exports for convenience.
pub use adapter::{
    Adapter, AdapterError, AdapterResult, BusStatus, ChannelCondition, InitTiming, MessageType,
    WireMessage, WireTimestamp,
};
pub use canapi_btr::{BitTiming, Bitrate, BitrateIndex, BusSpeed};
pub use driver::{CancelToken, Counters, Driver};
pub use error::{CanError, CanResult};
pub use event::{ReceiveEvent, Timeout, WaitOutcome};
pub use mock::{MockAdapter, MockOp};
pub use status::{BusLoad, ChannelInfo};
pub use table::{ChannelTable, DEFAULT_CAPACITY};
pub use types::{
    BOARDS, Board, BoardParams, BoardState, CanMessage, CanStatus, FrameFormat, Handle, OpMode,
    Timestamp, dlc_to_len, len_to_dlc,
};
