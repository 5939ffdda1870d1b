//! CAN bit-timing descriptors and the conversions between their forms.
//!
//! A bit-rate is either a symbolic index (1M down to 10K, encoded as a
//! non-positive integer) or explicit register fields with an optional CAN FD
//! data phase. The codec converts between:
//! - symbolic index and register fields (`index_to_bitrate`)
//! - `key=value` strings (`string_to_bitrate` / `bitrate_to_string`)
//! - the packed SJA1000 BTR0BTR1 word (`bitrate_to_sja1000` / `sja1000_to_bitrate`)
//! - bus speed and sample point (`bitrate_to_speed`)
//!
//! Everything here is pure; range violations are errors, never clamps.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{
    bitrate_to_sja1000, bitrate_to_speed, bitrate_to_string, index_to_bitrate,
    sja1000_to_bitrate, string_to_bitrate, validate_fd,
};
pub use error::{BtrError, BtrResult};
pub use types::{
    BitTiming, Bitrate, BitrateIndex, BusSpeed, DataTiming, NominalTiming, PhaseSpeed,
    SJA1000_CLOCK,
};
