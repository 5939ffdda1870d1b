//! Monitor configuration, loadable from TOML.

use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Deserialize;

use canapi_btr::{BitTiming, Bitrate, BitrateIndex};
use canapi_core::{Adapter, Board, MockAdapter, OpMode, Timeout};

/// Top-level configuration for the monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct MoniConfig {
    /// Channel name from the board table (e.g. "PCAN-USB1").
    pub board: String,
    /// Adapter driving the channel.
    #[serde(default)]
    pub adapter: AdapterKind,
    /// Operation-mode flags.
    #[serde(default)]
    pub mode: ModeConfig,
    /// Predefined bit-rate in kbit/s.
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    /// Explicit `key=value` bit-timing. Takes precedence over `baudrate`.
    #[serde(default)]
    pub bitrate: Option<String>,
    /// Receive timeout in milliseconds; 65535 waits forever.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u16,
    /// Channel-table capacity.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Standard identifiers not to log, as single ids or `[first, last]` ranges.
    #[serde(default)]
    pub exclude: Vec<IdRange>,
    /// Log only the `exclude` identifiers instead. Extended identifiers are
    /// then suppressed as well.
    #[serde(default)]
    pub exclude_invert: bool,
    /// Do not log extended-identifier frames.
    #[serde(default)]
    pub exclude_extended: bool,
}

/// Adapters the monitor can be built with. Only in-process ones exist so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Silent mock: nothing is received unless queued.
    #[default]
    Mock,
    /// Mock that echoes every transmitted frame.
    Loopback,
}

impl AdapterKind {
    pub fn build(self) -> Arc<dyn Adapter> {
        match self {
            Self::Mock => Arc::new(MockAdapter::new()),
            Self::Loopback => Arc::new(MockAdapter::loopback()),
        }
    }
}

/// One `exclude` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IdRange {
    Single(u32),
    /// Inclusive; the bounds may be given in either order.
    Span([u32; 2]),
}

impl IdRange {
    pub fn bounds(self) -> RangeInclusive<u32> {
        match self {
            Self::Single(id) => id..=id,
            Self::Span([a, b]) => a.min(b)..=a.max(b),
        }
    }
}

impl From<u32> for IdRange {
    fn from(id: u32) -> Self {
        Self::Single(id)
    }
}

impl From<RangeInclusive<u32>> for IdRange {
    fn from(range: RangeInclusive<u32>) -> Self {
        Self::Span([*range.start(), *range.end()])
    }
}

/// Operation-mode flags, all off by default.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    pub fdoe: bool,
    pub brse: bool,
    pub niso: bool,
    pub shared: bool,
    pub nxtd: bool,
    pub nrtr: bool,
    pub err: bool,
    pub mon: bool,
}

impl ModeConfig {
    pub fn op_mode(&self) -> OpMode {
        let mut mode = OpMode::DEFAULT;
        mode.set(OpMode::FDOE, self.fdoe);
        mode.set(OpMode::BRSE, self.brse);
        mode.set(OpMode::NISO, self.niso);
        mode.set(OpMode::SHRD, self.shared);
        mode.set(OpMode::NXTD, self.nxtd);
        mode.set(OpMode::NRTR, self.nrtr);
        mode.set(OpMode::ERR, self.err);
        mode.set(OpMode::MON, self.mon);
        mode
    }
}

fn default_baudrate() -> u32 {
    250
}

fn default_timeout_ms() -> u16 {
    1000
}

fn default_capacity() -> usize {
    canapi_core::DEFAULT_CAPACITY
}

impl MoniConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {path}"))?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn board(&self) -> anyhow::Result<Board> {
        Board::from_name(&self.board).with_context(|| format!("unknown board `{}`", self.board))
    }

    pub fn op_mode(&self) -> OpMode {
        self.mode.op_mode()
    }

    /// Resolve the bit-rate to start with. CAN FD needs explicit timing.
    pub fn bitrate(&self) -> anyhow::Result<Bitrate> {
        if let Some(text) = &self.bitrate {
            let timing: BitTiming = text
                .parse()
                .with_context(|| format!("invalid bitrate `{text}`"))?;
            return Ok(timing.into());
        }
        if self.mode.fdoe {
            bail!("CAN FD mode requires an explicit `bitrate`, not a `baudrate` index");
        }
        let index = BitrateIndex::from_kbps(self.baudrate)
            .with_context(|| format!("invalid baudrate {}", self.baudrate))?;
        Ok(index.into())
    }

    pub fn timeout(&self) -> Timeout {
        Timeout::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let toml = r#"
board = "PCAN-USB1"
"#;
        let config: MoniConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.board().unwrap(), Board(0x51));
        assert_eq!(config.op_mode(), OpMode::DEFAULT);
        assert_eq!(config.baudrate, 250); // default
        assert_eq!(config.timeout_ms, 1000); // default
        assert_eq!(config.capacity, 16); // default
        assert!(config.exclude.is_empty());
        assert!(!config.exclude_invert);
        assert_eq!(config.adapter, AdapterKind::Mock);
        assert_eq!(
            config.bitrate().unwrap(),
            Bitrate::Index(BitrateIndex::Kbps250)
        );
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
board = "pcan-usb9"
adapter = "loopback"
baudrate = 500
timeout_ms = 65535
capacity = 4
exclude = [0x100, [0x2FF, 0x200], 0x7DF]
exclude_extended = true

[mode]
err = true
mon = true
"#;
        let config: MoniConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.board().unwrap(), Board(0x509));
        assert_eq!(config.adapter, AdapterKind::Loopback);
        assert_eq!(config.op_mode(), OpMode::ERR | OpMode::MON);
        assert_eq!(config.timeout(), Timeout::Forever);
        assert_eq!(config.capacity, 4);
        assert_eq!(
            config.exclude,
            vec![
                IdRange::Single(0x100),
                IdRange::Span([0x2FF, 0x200]),
                IdRange::Single(0x7DF)
            ]
        );
        assert_eq!(config.exclude[1].bounds(), 0x200..=0x2FF);
        assert!(config.exclude_extended);
        assert_eq!(
            config.bitrate().unwrap(),
            Bitrate::Index(BitrateIndex::Kbps500)
        );
    }

    #[test]
    fn bitrate_string_wins_over_baudrate() {
        let toml = r#"
board = "PCAN-USB2"
baudrate = 125
bitrate = "f_clock_mhz=80,nom_brp=2,nom_tseg1=63,nom_tseg2=16,nom_sjw=16,data_brp=2,data_tseg1=15,data_tseg2=4,data_sjw=4"

[mode]
fdoe = true
brse = true
"#;
        let config: MoniConfig = toml::from_str(toml).unwrap();
        let Bitrate::Timing(timing) = config.bitrate().unwrap() else {
            panic!("expected explicit timing");
        };
        assert_eq!(timing.frequency, 80_000_000);
        assert!(timing.has_data_phase());
    }

    #[test]
    fn fd_mode_rejects_index() {
        let toml = r#"
board = "PCAN-USB1"

[mode]
fdoe = true
"#;
        let config: MoniConfig = toml::from_str(toml).unwrap();
        assert!(config.bitrate().is_err());
    }

    #[test]
    fn unknown_board_and_speed_rejected() {
        let config: MoniConfig = toml::from_str("board = \"PCAN-PCI1\"\nbaudrate = 333").unwrap();
        assert!(config.board().is_err());
        assert!(config.bitrate().is_err());
    }

    #[test]
    fn unknown_adapter_rejected() {
        assert!(toml::from_str::<MoniConfig>("board = \"PCAN-USB1\"\nadapter = \"pcan\"").is_err());
    }

    #[test]
    fn missing_board_fails() {
        assert!(toml::from_str::<MoniConfig>("baudrate = 250").is_err());
    }
}
