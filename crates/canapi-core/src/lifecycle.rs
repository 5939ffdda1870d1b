//! Channel lifecycle: probe, open, start, stop, close and kill.
//!
//! Free → Opened → Started → Stopped → (start again) → Closed. Entry guards
//! run before any side effect; a failed start leaves the slot stopped and
//! closable.

use std::sync::Arc;

use canapi_btr::{
    BitTiming, Bitrate, BtrError, SJA1000_CLOCK, bitrate_to_sja1000, bitrate_to_string,
    validate_fd,
};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, ChannelCondition, InitTiming, param};
use crate::error::{CanError, CanResult};
use crate::event::ReceiveEvent;
use crate::table::{Channel, ChannelTable, Slot, Slots, find_board};
use crate::types::{Board, BoardParams, BoardState, CanStatus, FrameFormat, Handle, OpMode};

impl ChannelTable {
    /// Test whether `board` could be opened in `mode`. Allocates nothing.
    pub async fn probe(&self, board: Board, mode: OpMode) -> CanResult<BoardState> {
        let slots = self.lock().await;
        if find_board(&slots, board).is_some() {
            return Ok(BoardState::Occupied);
        }
        drop(slots);

        let state = match self.adapter.channel_condition(board).await? {
            ChannelCondition::Available => BoardState::Present,
            ChannelCondition::Shared if mode.contains(OpMode::SHRD) => BoardState::Present,
            ChannelCondition::Shared | ChannelCondition::Occupied => BoardState::Occupied,
            ChannelCondition::Unavailable => BoardState::NotPresent,
            ChannelCondition::Unknown(_) => BoardState::NotTestable,
        };
        debug!(board = %board, ?state, "probed channel");
        Ok(state)
    }

    /// Bind `board` to the first free slot.
    pub async fn open(&self, board: Board, mode: OpMode, params: BoardParams) -> CanResult<Handle> {
        free_slot(&*self.lock().await, board)?;

        match self.adapter.channel_condition(board).await? {
            ChannelCondition::Available => {}
            ChannelCondition::Shared if mode.contains(OpMode::SHRD) => {}
            ChannelCondition::Shared | ChannelCondition::Occupied => {
                return Err(CanError::AlreadyOpen);
            }
            ChannelCondition::Unavailable => {
                return Err(CanError::Adapter(AdapterError::IllegalHardware));
            }
            ChannelCondition::Unknown(code) => {
                return Err(CanError::Adapter(AdapterError::Unknown(code)));
            }
        }

        // Another open may have claimed the board or the slot meanwhile.
        let mut slots = self.lock().await;
        let index = free_slot(&slots, board)?;
        slots[index] = Some(Slot::new(Channel::new(board, mode, params)));
        let handle = Handle(index);
        info!(handle = %handle, board = %board, mode = mode.bits(), "channel opened");
        Ok(handle)
    }

    /// Release the slot and relinquish the board.
    pub async fn close(&self, handle: Handle) -> CanResult<()> {
        let slot = self
            .lock()
            .await
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(CanError::HandleInvalid)?;

        let mut ch = slot.channel.lock().await;
        if let Some(event) = ch.event.take() {
            event.destroy();
        }
        ch.status.can_stopped = true;
        if let Err(e) = self.adapter.uninitialize(ch.board).await {
            warn!(handle = %handle, board = %ch.board, error = %e, "uninitialize failed on close");
        }
        info!(handle = %handle, board = %ch.board, "channel closed");
        Ok(())
    }

    /// Initialize the controller at `bitrate` and go on bus.
    pub async fn start(&self, handle: Handle, bitrate: Bitrate) -> CanResult<()> {
        let channel = self.channel(handle).await?;
        let mut ch = channel.lock().await;
        if ch.is_running() {
            return Err(CanError::AlreadyOnline);
        }
        let format = FrameFormat::from_mode(ch.mode);
        let timing = init_timing(format, &bitrate)?;
        let board = ch.board;

        if ch.reset {
            debug!(handle = %handle, board = %board, "re-initializing controller");
            if let Err(e) = self.shut_down_controller(board).await {
                warn!(handle = %handle, board = %board, error = %e, "controller reset failed");
                return Err(e);
            }
        }

        if ch.mode.contains(OpMode::MON) {
            self.adapter
                .set_value(board, param::LISTEN_ONLY, &param::PARAMETER_ON.to_le_bytes())
                .await?;
        }

        if let Err(e) = self.adapter.initialize(board, &ch.params, &timing).await {
            warn!(handle = %handle, board = %board, error = %e, "initialize failed");
            return Err(e.into());
        }

        if let Some(old) = ch.event.take() {
            old.destroy();
        }
        let event = Arc::new(ReceiveEvent::new());
        if let Err(e) = self.adapter.bind_receive_event(board, event.clone()).await {
            warn!(handle = %handle, board = %board, error = %e, "receive event binding failed");
            event.destroy();
            if let Err(e) = self.adapter.uninitialize(board).await {
                warn!(handle = %handle, board = %board, error = %e, "uninitialize failed");
            }
            return Err(e.into());
        }

        ch.event = Some(event);
        ch.bitrate = Some(bitrate);
        ch.format = format;
        ch.status = CanStatus::default();
        ch.reset = false;
        info!(handle = %handle, board = %board, ?format, "controller started");
        Ok(())
    }

    /// Reset and uninitialize a controller that was stopped after running.
    ///
    /// `NotInitialized` means an earlier failed start already left the
    /// controller down.
    async fn shut_down_controller(&self, board: Board) -> CanResult<()> {
        match self.adapter.reset(board).await {
            Ok(()) => {}
            Err(AdapterError::NotInitialized) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        match self.adapter.uninitialize(board).await {
            Ok(()) | Err(AdapterError::NotInitialized) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Take the controller off bus. A later start fully re-initializes it.
    pub async fn stop(&self, handle: Handle) -> CanResult<()> {
        let channel = self.channel(handle).await?;
        let mut ch = channel.lock().await;
        if ch.is_running() {
            ch.reset = true;
            info!(handle = %handle, board = %ch.board, "controller stopped");
        }
        ch.status.can_stopped = true;
        Ok(())
    }

    /// Wake a receive blocked on `handle` without changing channel state.
    ///
    /// A free slot inside the table is not an error.
    pub async fn kill(&self, handle: Handle) -> CanResult<()> {
        let slot = self
            .lock()
            .await
            .get(handle.index())
            .ok_or(CanError::HandleInvalid)?
            .clone();
        if let Some(slot) = slot
            && let Some(event) = slot.channel.lock().await.event.as_ref()
        {
            debug!(handle = %handle, "signaling receive event");
            event.signal();
        }
        Ok(())
    }

    /// Wake every blocked receive.
    pub async fn kill_all(&self) {
        for channel in self.channels().await {
            if let Some(event) = channel.lock().await.event.as_ref() {
                event.signal();
            }
        }
        debug!("signaled all receive events");
    }
}

/// Index of the first free slot, provided `board` is not bound already.
fn free_slot(slots: &Slots, board: Board) -> CanResult<usize> {
    if find_board(slots, board).is_some() {
        return Err(CanError::AlreadyOpen);
    }
    slots
        .iter()
        .position(Option::is_none)
        .ok_or(CanError::ResourceBusy)
}

/// Resolve the adapter initialization argument for a frame format.
fn init_timing(format: FrameFormat, bitrate: &Bitrate) -> CanResult<InitTiming> {
    match (format, bitrate) {
        (FrameFormat::Classic, Bitrate::Index(index)) => Ok(InitTiming::Btr0Btr1(index.btr0btr1())),
        (FrameFormat::Classic, Bitrate::Timing(timing)) => {
            if timing.frequency != SJA1000_CLOCK {
                return Err(BtrError::UnsupportedClock(timing.frequency).into());
            }
            Ok(InitTiming::Btr0Btr1(bitrate_to_sja1000(timing)?))
        }
        (_, Bitrate::Index(_)) => Err(BtrError::IndexInFdMode.into()),
        (FrameFormat::Fd, Bitrate::Timing(timing)) => {
            let nominal: BitTiming = timing.nominal_only();
            validate_fd(&nominal)?;
            Ok(InitTiming::Fd(bitrate_to_string(&nominal)))
        }
        (FrameFormat::FdBrs, Bitrate::Timing(timing)) => {
            if !timing.has_data_phase() {
                return Err(BtrError::MissingKey("data_brp").into());
            }
            validate_fd(timing)?;
            Ok(InitTiming::Fd(bitrate_to_string(timing)))
        }
    }
}
