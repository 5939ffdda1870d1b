//! Bit-rate descriptor types.

use serde::{Deserialize, Serialize};

use crate::error::{BtrError, BtrResult};

/// Controller clock assumed by the SJA1000 BTR0BTR1 layout.
pub const SJA1000_CLOCK: u32 = 8_000_000;

// ── Symbolic index ──────────────────────────────────────────────

/// Predefined CAN 2.0 bit-rates.
///
/// On the wire of the caller-facing API an index is a non-positive integer:
/// 1M is `0`, 800K is `-1`, and so on down to 10K at `-8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitrateIndex {
    Kbps1000,
    Kbps800,
    Kbps500,
    #[default]
    Kbps250,
    Kbps125,
    Kbps100,
    Kbps50,
    Kbps20,
    Kbps10,
}

impl BitrateIndex {
    /// All indices, fastest first.
    pub const ALL: [BitrateIndex; 9] = [
        BitrateIndex::Kbps1000,
        BitrateIndex::Kbps800,
        BitrateIndex::Kbps500,
        BitrateIndex::Kbps250,
        BitrateIndex::Kbps125,
        BitrateIndex::Kbps100,
        BitrateIndex::Kbps50,
        BitrateIndex::Kbps20,
        BitrateIndex::Kbps10,
    ];

    /// Non-positive integer code of this index.
    pub fn code(self) -> i32 {
        match self {
            BitrateIndex::Kbps1000 => 0,
            BitrateIndex::Kbps800 => -1,
            BitrateIndex::Kbps500 => -2,
            BitrateIndex::Kbps250 => -3,
            BitrateIndex::Kbps125 => -4,
            BitrateIndex::Kbps100 => -5,
            BitrateIndex::Kbps50 => -6,
            BitrateIndex::Kbps20 => -7,
            BitrateIndex::Kbps10 => -8,
        }
    }

    pub fn from_code(code: i32) -> BtrResult<Self> {
        Self::ALL
            .into_iter()
            .find(|index| index.code() == code)
            .ok_or(BtrError::UnknownIndex(code))
    }

    /// Nominal bit-rate in kbit/s.
    pub fn kbps(self) -> u32 {
        match self {
            BitrateIndex::Kbps1000 => 1000,
            BitrateIndex::Kbps800 => 800,
            BitrateIndex::Kbps500 => 500,
            BitrateIndex::Kbps250 => 250,
            BitrateIndex::Kbps125 => 125,
            BitrateIndex::Kbps100 => 100,
            BitrateIndex::Kbps50 => 50,
            BitrateIndex::Kbps20 => 20,
            BitrateIndex::Kbps10 => 10,
        }
    }

    /// Look up an index by speed, given either in kbit/s (`250`) or bit/s (`250000`).
    pub fn from_kbps(speed: u32) -> BtrResult<Self> {
        Self::ALL
            .into_iter()
            .find(|index| index.kbps() == speed || index.kbps() * 1000 == speed)
            .ok_or(BtrError::UnknownSpeed(speed))
    }

    /// Canonical BTR0BTR1 word for this index (SJA1000 at 8 MHz).
    pub fn btr0btr1(self) -> u16 {
        match self {
            BitrateIndex::Kbps1000 => 0x0014,
            BitrateIndex::Kbps800 => 0x0016,
            BitrateIndex::Kbps500 => 0x001C,
            BitrateIndex::Kbps250 => 0x011C,
            BitrateIndex::Kbps125 => 0x031C,
            BitrateIndex::Kbps100 => 0x432F,
            BitrateIndex::Kbps50 => 0x472F,
            BitrateIndex::Kbps20 => 0x532F,
            BitrateIndex::Kbps10 => 0x672F,
        }
    }
}

impl std::fmt::Display for BitrateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}kbps", self.kbps())
    }
}

// ── Register fields ─────────────────────────────────────────────

/// Arbitration-phase timing registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NominalTiming {
    /// Bit-rate prescaler.
    pub brp: u16,
    /// Time segment 1 (propagation + phase 1), in time quanta.
    pub tseg1: u16,
    /// Time segment 2, in time quanta.
    pub tseg2: u16,
    /// Synchronization jump width.
    pub sjw: u16,
    /// Triple sampling (0 or 1). Ignored in CAN FD mode.
    #[serde(default)]
    pub sam: u8,
}

/// Data-phase timing registers (CAN FD bit-rate switching).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DataTiming {
    pub brp: u16,
    pub tseg1: u16,
    pub tseg2: u16,
    pub sjw: u16,
}

/// Explicit bit-timing: controller clock plus register fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitTiming {
    /// Controller clock in Hz.
    pub frequency: u32,
    pub nominal: NominalTiming,
    /// Present only when the bit-rate switch is in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataTiming>,
}

impl BitTiming {
    /// Whether a data phase is configured.
    pub fn has_data_phase(&self) -> bool {
        self.data.is_some()
    }

    /// Same timing with the data phase dropped.
    pub fn nominal_only(&self) -> Self {
        Self { data: None, ..*self }
    }
}

impl std::str::FromStr for BitTiming {
    type Err = BtrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::codec::string_to_bitrate(s)
    }
}

impl std::fmt::Display for BitTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::codec::bitrate_to_string(self))
    }
}

/// A bit-rate setting as handed to `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bitrate {
    Index(BitrateIndex),
    Timing(BitTiming),
}

impl Bitrate {
    /// Resolve to explicit register fields.
    pub fn to_timing(&self) -> BitTiming {
        match self {
            Bitrate::Index(index) => crate::codec::sja1000_to_bitrate(index.btr0btr1()),
            Bitrate::Timing(timing) => *timing,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Bitrate::Index(_))
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Bitrate::Index(BitrateIndex::default())
    }
}

impl From<BitrateIndex> for Bitrate {
    fn from(index: BitrateIndex) -> Self {
        Bitrate::Index(index)
    }
}

impl From<BitTiming> for Bitrate {
    fn from(timing: BitTiming) -> Self {
        Bitrate::Timing(timing)
    }
}

// ── Bus speed ───────────────────────────────────────────────────

/// Speed and sample point of one bus phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpeed {
    /// Bits per second.
    pub speed: f64,
    /// Fraction of the bit time before sampling (0.0–1.0).
    pub samplepoint: f64,
}

/// Transmission rate derived from a bit-timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusSpeed {
    pub nominal: PhaseSpeed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PhaseSpeed>,
}
