//! Channel table: fixed-capacity arena of channel records.
//!
//! Handles are slot indices. A slot is either free (`None`) or bound to one
//! board; a board occupies at most one slot. The operations live next to the
//! concern they implement:
//! - `lifecycle.rs`: probe/open/close/start/stop/kill
//! - `io.rs`: write/read
//! - `status.rs`: status, bus-load, bit-rate, properties, versions

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::adapter::Adapter;
use crate::error::{CanError, CanResult};
use crate::event::ReceiveEvent;
use crate::types::{Board, BoardParams, CanStatus, FrameFormat, Handle, OpMode};
use canapi_btr::Bitrate;

/// Default number of slots.
pub const DEFAULT_CAPACITY: usize = 16;

/// State of one opened channel.
#[derive(Debug)]
pub(crate) struct Channel {
    pub board: Board,
    pub params: BoardParams,
    pub mode: OpMode,
    pub status: CanStatus,
    /// Bit-rate of the last successful start.
    pub bitrate: Option<Bitrate>,
    /// Frame capability resolved at start.
    pub format: FrameFormat,
    /// Full re-initialization required before the next start.
    pub reset: bool,
    pub event: Option<Arc<ReceiveEvent>>,
}

impl Channel {
    pub fn new(board: Board, mode: OpMode, params: BoardParams) -> Self {
        Self {
            board,
            params,
            mode,
            status: CanStatus::stopped(),
            bitrate: None,
            format: FrameFormat::from_mode(mode),
            reset: false,
            event: None,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.status.can_stopped
    }

    /// Entry guard for I/O: the controller must be started.
    pub fn ensure_online(&self) -> CanResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CanError::Offline)
        }
    }
}

/// An occupied slot. The board is kept outside the channel lock so lookups
/// never wait on I/O in progress on another handle.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub board: Board,
    pub channel: Arc<Mutex<Channel>>,
}

impl Slot {
    pub fn new(channel: Channel) -> Self {
        Self {
            board: channel.board,
            channel: Arc::new(Mutex::new(channel)),
        }
    }
}

pub(crate) type Slots = Vec<Option<Slot>>;

/// Table of logical channels multiplexed onto one adapter.
///
/// The table lock guards slot allocation only. Each channel has its own lock,
/// so operations on different handles never wait for each other.
pub struct ChannelTable {
    pub(crate) adapter: Arc<dyn Adapter>,
    slots: Mutex<Slots>,
}

impl ChannelTable {
    /// Create a table with [`DEFAULT_CAPACITY`] free slots.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self::with_capacity(adapter, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(adapter: Arc<dyn Adapter>, capacity: usize) -> Self {
        let slots = std::iter::repeat_with(|| None).take(capacity).collect();
        Self {
            adapter,
            slots: Mutex::new(slots),
        }
    }

    pub async fn capacity(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Number of occupied slots.
    pub async fn open_count(&self) -> usize {
        self.slots.lock().await.iter().flatten().count()
    }

    /// Handle of the slot bound to `board`, if any.
    pub async fn find(&self, board: Board) -> Option<Handle> {
        let slots = self.slots.lock().await;
        find_board(&slots, board)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().await
    }

    /// Occupied slot for `handle`. The table lock is released on return.
    pub(crate) async fn slot(&self, handle: Handle) -> CanResult<Slot> {
        let slots = self.lock().await;
        slot(&slots, handle).cloned()
    }

    /// Channel record for `handle`, to be locked by the caller.
    pub(crate) async fn channel(&self, handle: Handle) -> CanResult<Arc<Mutex<Channel>>> {
        Ok(self.slot(handle).await?.channel)
    }

    /// Every open channel, collected without holding the table lock afterwards.
    pub(crate) async fn channels(&self) -> Vec<Arc<Mutex<Channel>>> {
        let slots = self.lock().await;
        slots.iter().flatten().map(|s| s.channel.clone()).collect()
    }
}

pub(crate) fn find_board(slots: &Slots, board: Board) -> Option<Handle> {
    slots
        .iter()
        .position(|slot| slot.as_ref().is_some_and(|s| s.board == board))
        .map(Handle)
}

/// Occupied slot for `handle`, or `HandleInvalid`.
pub(crate) fn slot(slots: &Slots, handle: Handle) -> CanResult<&Slot> {
    slots
        .get(handle.index())
        .and_then(Option::as_ref)
        .ok_or(CanError::HandleInvalid)
}
