//! Core CAN types: boards, operation mode, status register, messages.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::adapter::BusStatus;

// ── Boards ──────────────────────────────────────────────────────

/// Identity of a physical adapter channel (vendor channel handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board(pub u16);

impl Board {
    /// Pseudo-board for API-level queries that are not bound to a channel.
    pub const NONE: Board = Board(0x00);

    /// Look up a board by its name in [`BOARDS`] (case-insensitive).
    pub fn from_name(name: &str) -> Option<Board> {
        BOARDS
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(board, _)| *board)
    }

    pub fn name(self) -> Option<&'static str> {
        BOARDS.iter().find(|(b, _)| *b == self).map(|(_, n)| *n)
    }

    /// USB channels carry the USB bus type in either handle nibble.
    pub fn is_usb(self) -> bool {
        const USB: u16 = 0x5;
        ((self.0 & 0x00F0) >> 4) == USB || ((self.0 & 0x0F00) >> 8) == USB
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:03X}", self.0),
        }
    }
}

/// Known adapter channels.
pub const BOARDS: [(Board, &str); 16] = [
    (Board(0x051), "PCAN-USB1"),
    (Board(0x052), "PCAN-USB2"),
    (Board(0x053), "PCAN-USB3"),
    (Board(0x054), "PCAN-USB4"),
    (Board(0x055), "PCAN-USB5"),
    (Board(0x056), "PCAN-USB6"),
    (Board(0x057), "PCAN-USB7"),
    (Board(0x058), "PCAN-USB8"),
    (Board(0x509), "PCAN-USB9"),
    (Board(0x50A), "PCAN-USB10"),
    (Board(0x50B), "PCAN-USB11"),
    (Board(0x50C), "PCAN-USB12"),
    (Board(0x50D), "PCAN-USB13"),
    (Board(0x50E), "PCAN-USB14"),
    (Board(0x50F), "PCAN-USB15"),
    (Board(0x510), "PCAN-USB16"),
];

/// Hardware parameters for non-plug-and-play boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardParams {
    /// Board type code.
    pub kind: u8,
    /// I/O port address.
    pub port: u32,
    /// Interrupt number.
    pub irq: u16,
}

/// Result of probing a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    Present,
    NotPresent,
    Occupied,
    NotTestable,
}

/// Opaque handle: index of an occupied slot in the channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub usize);

impl Handle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Operation mode ──────────────────────────────────────────────

bitflags! {
    /// Operation-mode byte selected at open.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpMode: u8 {
        /// Monitor (listen-only) mode.
        const MON = 0x01;
        /// Deliver error frames.
        const ERR = 0x02;
        /// Suppress remote frames.
        const NRTR = 0x04;
        /// Suppress extended frames.
        const NXTD = 0x08;
        /// Shared access.
        const SHRD = 0x10;
        /// Non-ISO CAN FD.
        const NISO = 0x20;
        /// Bit-rate switch enable.
        const BRSE = 0x40;
        /// CAN FD operation enable.
        const FDOE = 0x80;
    }
}

impl OpMode {
    pub const DEFAULT: OpMode = OpMode::empty();
}

/// Frame capability of a channel, resolved once from its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    #[default]
    Classic,
    Fd,
    FdBrs,
}

impl FrameFormat {
    pub fn from_mode(mode: OpMode) -> Self {
        if !mode.contains(OpMode::FDOE) {
            FrameFormat::Classic
        } else if mode.contains(OpMode::BRSE) {
            FrameFormat::FdBrs
        } else {
            FrameFormat::Fd
        }
    }

    pub fn is_fd(self) -> bool {
        !matches!(self, FrameFormat::Classic)
    }

    /// Largest payload a frame may carry in this format.
    pub fn max_payload(self) -> usize {
        if self.is_fd() {
            CANFD_MAX_LEN
        } else {
            CAN_MAX_LEN
        }
    }
}

// ── Status register ─────────────────────────────────────────────

/// Sticky controller status.
///
/// Bits accumulate across reads and polls; only a successful start clears
/// them. Packed into a single byte only at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanStatus {
    pub can_stopped: bool,
    pub bus_off: bool,
    pub warning_level: bool,
    pub bus_error: bool,
    pub transmitter_busy: bool,
    pub receiver_empty: bool,
    pub message_lost: bool,
}

impl CanStatus {
    pub const CAN_STOPPED: u8 = 0x80;
    pub const BUS_OFF: u8 = 0x40;
    pub const WARNING_LEVEL: u8 = 0x20;
    pub const BUS_ERROR: u8 = 0x10;
    pub const TRANSMITTER_BUSY: u8 = 0x08;
    pub const RECEIVER_EMPTY: u8 = 0x04;
    pub const MESSAGE_LOST: u8 = 0x02;

    /// Status of a controller that has not been started.
    pub fn stopped() -> Self {
        Self {
            can_stopped: true,
            ..Self::default()
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        let bits = [
            (self.can_stopped, Self::CAN_STOPPED),
            (self.bus_off, Self::BUS_OFF),
            (self.warning_level, Self::WARNING_LEVEL),
            (self.bus_error, Self::BUS_ERROR),
            (self.transmitter_busy, Self::TRANSMITTER_BUSY),
            (self.receiver_empty, Self::RECEIVER_EMPTY),
            (self.message_lost, Self::MESSAGE_LOST),
        ];
        for (set, bit) in bits {
            if set {
                byte |= bit;
            }
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            can_stopped: byte & Self::CAN_STOPPED != 0,
            bus_off: byte & Self::BUS_OFF != 0,
            warning_level: byte & Self::WARNING_LEVEL != 0,
            bus_error: byte & Self::BUS_ERROR != 0,
            transmitter_busy: byte & Self::TRANSMITTER_BUSY != 0,
            receiver_empty: byte & Self::RECEIVER_EMPTY != 0,
            message_lost: byte & Self::MESSAGE_LOST != 0,
        }
    }

    /// OR-merge adapter-reported bus conditions into the sticky bits.
    pub(crate) fn merge(&mut self, bus: BusStatus) {
        self.bus_off |= bus.contains(BusStatus::BUS_OFF);
        self.bus_error |= bus.intersects(BusStatus::BUS_LIGHT | BusStatus::BUS_PASSIVE);
        self.warning_level |= bus.intersects(BusStatus::BUS_HEAVY | BusStatus::BUS_WARNING);
        self.message_lost |= bus.intersects(BusStatus::OVERRUN | BusStatus::QUEUE_OVERRUN);
        self.transmitter_busy |=
            bus.intersects(BusStatus::TRANSMIT_FULL | BusStatus::QUEUE_TRANSMIT_FULL);
    }
}

// ── Messages ────────────────────────────────────────────────────

/// Maximum payload of a CAN 2.0 frame.
pub const CAN_MAX_LEN: usize = 8;

/// Maximum payload of a CAN FD frame.
pub const CANFD_MAX_LEN: usize = 64;

const DLC_TABLE: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Payload length encoded by a data-length code.
pub fn dlc_to_len(dlc: u8) -> usize {
    DLC_TABLE[usize::from(dlc & 0x0F)]
}

/// Smallest data-length code whose payload holds `len` bytes.
pub fn len_to_dlc(len: usize) -> u8 {
    DLC_TABLE
        .iter()
        .position(|&n| n >= len)
        .unwrap_or(DLC_TABLE.len() - 1) as u8
}

/// Receive timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub usec: u32,
}

/// A normalized CAN or CAN FD message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanMessage {
    /// Arbitration identifier (11 or 29 bit).
    pub id: u32,
    /// Extended (29-bit) identifier.
    pub xtd: bool,
    /// Remote transmission request.
    pub rtr: bool,
    /// CAN FD format.
    pub fdf: bool,
    /// Bit-rate switch.
    pub brs: bool,
    /// Error state indicator (receive only).
    pub esi: bool,
    /// Status message rather than a bus frame.
    pub sts: bool,
    /// Data-length code. For a remote frame this is the requested length.
    pub dlc: u8,
    /// Payload, 0–8 bytes classic or 0–64 bytes FD. Empty for remote frames.
    pub data: Vec<u8>,
    pub timestamp: Timestamp,
}

impl CanMessage {
    /// Standard-id data frame.
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            id,
            dlc: len_to_dlc(data.len()),
            data,
            ..Self::default()
        }
    }

    /// Extended-id data frame.
    pub fn extended(id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            xtd: true,
            ..Self::new(id, data)
        }
    }

    /// CAN FD frame, optionally with bit-rate switch.
    pub fn fd(id: u32, data: impl Into<Vec<u8>>, brs: bool) -> Self {
        Self {
            fdf: true,
            brs,
            ..Self::new(id, data)
        }
    }

    /// Remote frame requesting `dlc` bytes.
    pub fn remote(id: u32, dlc: u8) -> Self {
        Self {
            rtr: true,
            dlc,
            ..Self::new(id, Vec::new())
        }
    }
}
