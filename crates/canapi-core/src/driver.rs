//! Driver facade: one caller-owned view of one table slot.
//!
//! Caches the operation mode and bit-rate and keeps the tx/rx/error-frame
//! counters. Dropping a `Driver` does not close its channel.

use std::sync::Arc;

use canapi_btr::{BitTiming, Bitrate, BusSpeed, bitrate_to_speed};
use serde::Serialize;

use crate::error::{CanError, CanResult};
use crate::event::Timeout;
use crate::status::BusLoad;
use crate::table::ChannelTable;
use crate::types::{Board, BoardParams, BoardState, CanMessage, CanStatus, Handle, OpMode};

/// Message counters since the last successful start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub tx_messages: u64,
    pub rx_messages: u64,
    pub error_frames: u64,
}

/// Wakes a receive blocked on one channel. Cloneable and `Send`, so it can
/// be handed to a signal handler while the owner sits in `read_message`.
#[derive(Clone)]
pub struct CancelToken {
    table: Arc<ChannelTable>,
    handle: Handle,
}

impl CancelToken {
    pub async fn cancel(&self) -> CanResult<()> {
        self.table.kill(self.handle).await
    }
}

pub struct Driver {
    table: Arc<ChannelTable>,
    handle: Option<Handle>,
    op_mode: OpMode,
    bitrate: Bitrate,
    counters: Counters,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("handle", &self.handle)
            .field("op_mode", &self.op_mode)
            .field("bitrate", &self.bitrate)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Driver {
    pub fn new(table: Arc<ChannelTable>) -> Self {
        Self {
            table,
            handle: None,
            op_mode: OpMode::DEFAULT,
            bitrate: Bitrate::default(),
            counters: Counters::default(),
        }
    }

    fn handle(&self) -> CanResult<Handle> {
        self.handle.ok_or(CanError::NotInitialized)
    }

    pub async fn probe_channel(&self, board: Board, mode: OpMode) -> CanResult<BoardState> {
        self.table.probe(board, mode).await
    }

    /// Open `board`. A driver holds at most one channel.
    pub async fn initialize_channel(
        &mut self,
        board: Board,
        mode: OpMode,
        params: BoardParams,
    ) -> CanResult<()> {
        if self.handle.is_some() {
            return Err(CanError::AlreadyOpen);
        }
        let handle = self.table.open(board, mode, params).await?;
        self.handle = Some(handle);
        self.op_mode = mode;
        Ok(())
    }

    pub async fn teardown_channel(&mut self) -> CanResult<()> {
        let handle = self.handle()?;
        self.table.close(handle).await?;
        self.handle = None;
        Ok(())
    }

    /// Wake a pending `read_message`.
    pub async fn signal_channel(&self) -> CanResult<()> {
        self.table.kill(self.handle()?).await
    }

    pub fn cancel_token(&self) -> CanResult<CancelToken> {
        Ok(CancelToken {
            table: self.table.clone(),
            handle: self.handle()?,
        })
    }

    /// Start the controller and reset the counters.
    pub async fn start_controller(&mut self, bitrate: Bitrate) -> CanResult<()> {
        self.table.start(self.handle()?, bitrate).await?;
        self.bitrate = bitrate;
        self.counters = Counters::default();
        Ok(())
    }

    pub async fn reset_controller(&mut self) -> CanResult<()> {
        self.table.stop(self.handle()?).await
    }

    pub async fn write_message(&mut self, msg: &CanMessage) -> CanResult<()> {
        self.table.write(self.handle()?, msg).await?;
        self.counters.tx_messages += 1;
        Ok(())
    }

    pub async fn read_message(&mut self, timeout: Timeout) -> CanResult<CanMessage> {
        let msg = self.table.read(self.handle()?, timeout).await?;
        if msg.sts {
            self.counters.error_frames += 1;
        } else {
            self.counters.rx_messages += 1;
        }
        Ok(msg)
    }

    pub async fn status(&self) -> CanResult<CanStatus> {
        self.table.status(self.handle()?).await
    }

    pub async fn bus_load(&self) -> CanResult<BusLoad> {
        self.table.bus_load(self.handle()?).await
    }

    /// Active bit-rate, `None` while the controller is stopped.
    pub async fn bitrate(&self) -> CanResult<Option<Bitrate>> {
        Ok(self.table.bitrate(self.handle()?).await?.0)
    }

    /// Bus speed of the active bit-rate, `None` while stopped.
    pub async fn bus_speed(&self) -> CanResult<Option<BusSpeed>> {
        match self.bitrate().await? {
            Some(bitrate) => Ok(Some(bitrate_to_speed(&bitrate.to_timing())?)),
            None => Ok(None),
        }
    }

    pub async fn property(&self, id: u8, max_len: usize) -> CanResult<Vec<u8>> {
        self.table.get_property(self.handle()?, id, max_len).await
    }

    pub async fn set_property(&self, id: u8, value: &[u8]) -> CanResult<()> {
        self.table.set_property(self.handle()?, id, value).await
    }

    pub async fn hardware_version(&self) -> CanResult<String> {
        self.table.hardware_version(self.handle()?).await
    }

    pub async fn firmware_version(&self) -> CanResult<String> {
        self.table.firmware_version().await
    }

    /// Raw table index backing this driver, for diagnostics.
    pub fn diagnostic_handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn op_mode(&self) -> OpMode {
        self.op_mode
    }

    /// Bit-rate passed to the last successful start.
    pub fn last_bitrate(&self) -> Bitrate {
        self.bitrate
    }

    // ── Bit-timing conversions ──────────────────────────────────

    pub fn index_to_bitrate(index: i32) -> CanResult<BitTiming> {
        Ok(canapi_btr::index_to_bitrate(index)?)
    }

    pub fn string_to_bitrate(text: &str) -> CanResult<BitTiming> {
        Ok(canapi_btr::string_to_bitrate(text)?)
    }

    pub fn bitrate_to_string(timing: &BitTiming) -> String {
        canapi_btr::bitrate_to_string(timing)
    }

    pub fn bitrate_to_speed(timing: &BitTiming) -> CanResult<BusSpeed> {
        Ok(bitrate_to_speed(timing)?)
    }
}
