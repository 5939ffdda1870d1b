//! Reception loop: open one channel and log every frame that passes the
//! identifier filter until the running flag is cleared.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::{debug, info, warn};

use canapi_core::{BoardParams, CanMessage, CanResult, ChannelTable, Driver, Timeout};

use crate::config::{IdRange, MoniConfig};

/// Largest standard (11-bit) identifier plus one.
const STANDARD_ID_LIMIT: u32 = 0x800;

/// Which received frames get logged.
///
/// The listed ranges apply to standard identifiers. Inverting the filter logs
/// only the listed identifiers and drops every extended one.
#[derive(Debug, Clone, Default)]
pub struct IdFilter {
    listed: Vec<RangeInclusive<u32>>,
    invert: bool,
    exclude_extended: bool,
}

impl IdFilter {
    /// Exclude the given identifiers and ranges.
    pub fn new<R: Into<IdRange>>(excluded: impl IntoIterator<Item = R>) -> Self {
        Self {
            listed: excluded.into_iter().map(|r| r.into().bounds()).collect(),
            ..Self::default()
        }
    }

    /// Log only the listed identifiers.
    pub fn inverted(self) -> Self {
        Self {
            invert: true,
            ..self
        }
    }

    /// Drop every extended identifier.
    pub fn without_extended(self) -> Self {
        Self {
            exclude_extended: true,
            ..self
        }
    }

    pub fn from_config(config: &MoniConfig) -> Self {
        Self {
            listed: config.exclude.iter().map(|r| r.bounds()).collect(),
            invert: config.exclude_invert,
            exclude_extended: config.exclude_extended,
        }
    }

    /// Status messages are never logged as frames.
    pub fn accepts(&self, msg: &CanMessage) -> bool {
        if msg.sts {
            return false;
        }
        if msg.id < STANDARD_ID_LIMIT {
            let listed = self.listed.iter().any(|range| range.contains(&msg.id));
            listed == self.invert
        } else {
            !self.invert && !self.exclude_extended
        }
    }
}

/// Open and start the configured channel on `table`.
pub async fn open(table: Arc<ChannelTable>, config: &MoniConfig) -> anyhow::Result<Driver> {
    let board = config.board()?;
    let mode = config.op_mode();
    let bitrate = config.bitrate()?;

    let mut driver = Driver::new(table);
    driver
        .initialize_channel(board, mode, BoardParams::default())
        .await
        .with_context(|| format!("opening {board}"))?;
    if let Err(e) = driver.start_controller(bitrate).await {
        if let Err(close) = driver.teardown_channel().await {
            warn!(board = %board, error = %close, "teardown after failed start");
        }
        return Err(anyhow::Error::new(e).context(format!("starting {board}")));
    }

    match driver.hardware_version().await {
        Ok(version) => info!(board = %board, hardware = %version, "hardware"),
        Err(e) => warn!(board = %board, error = %e, "hardware version unavailable"),
    }
    match driver.firmware_version().await {
        Ok(version) => info!(firmware = %version, "firmware"),
        Err(e) => warn!(error = %e, "firmware version unavailable"),
    }
    if let Some(speed) = driver.bus_speed().await? {
        info!(
            board = %board,
            nominal_bps = speed.nominal.speed,
            nominal_sp = speed.nominal.samplepoint,
            data_bps = ?speed.data.map(|d| d.speed),
            "controller started"
        );
    }
    Ok(driver)
}

/// Receive until `running` is cleared. Returns the number of frames logged.
///
/// Clearing `running` alone does not wake a blocked receive; pair it with
/// `ChannelTable::kill_all` or the driver's cancel token.
pub async fn run(
    driver: &mut Driver,
    timeout: Timeout,
    filter: &IdFilter,
    running: &AtomicBool,
) -> CanResult<u64> {
    let mut frames = 0u64;

    while running.load(Ordering::SeqCst) {
        match driver.read_message(timeout).await {
            Ok(msg) if filter.accepts(&msg) => {
                frames += 1;
                info!(
                    frame = frames,
                    id = msg.id,
                    xtd = msg.xtd,
                    rtr = msg.rtr,
                    fdf = msg.fdf,
                    brs = msg.brs,
                    dlc = msg.dlc,
                    data = %hex(&msg.data),
                    ts_sec = msg.timestamp.sec,
                    ts_usec = msg.timestamp.usec,
                    "frame"
                );
            }
            Ok(msg) => debug!(id = msg.id, sts = msg.sts, "frame filtered"),
            Err(e) if e.is_retryable() => {}
            Err(e) if e.is_bus_condition() => warn!(error = %e, "bus condition"),
            Err(e) => return Err(e),
        }
    }

    Ok(frames)
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
