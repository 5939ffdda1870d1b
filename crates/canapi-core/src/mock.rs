//! Mock CAN adapter for testing.
//!
//! Supports per-board channel conditions, injected frames and status frames,
//! loopback echo, bus-status words, one-shot failures and parameter storage.
//! All tests use this instead of real hardware so the suite runs anywhere;
//! the monitor binary falls back to it when no vendor driver is linked.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::adapter::{
    Adapter, AdapterError, AdapterResult, BusStatus, ChannelCondition, InitTiming, WireMessage,
    WireTimestamp, param,
};
use crate::event::ReceiveEvent;
use crate::types::{Board, BoardParams};

/// Adapter operation, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ChannelCondition,
    Initialize,
    Uninitialize,
    Reset,
    Read,
    Write,
    BusStatus,
    GetValue,
    SetValue,
    BindEvent,
}

const API_VERSION: &str = "4.6.2.753";
const CHANNEL_VERSION: &str = "PCAN-USB (mock) driver 8.18.0\nCopyright (C) 1995-2026";

#[derive(Debug, Default)]
struct MockChannel {
    timing: Option<InitTiming>,
    rx: VecDeque<WireMessage>,
    event: Option<Arc<ReceiveEvent>>,
    bus: BusStatus,
    resets: usize,
    uninits: usize,
}

#[derive(Debug, Default)]
struct MockState {
    conditions: HashMap<Board, ChannelCondition>,
    channels: HashMap<Board, MockChannel>,
    sent: Vec<(Board, WireMessage)>,
    failures: HashMap<MockOp, AdapterError>,
    values: HashMap<(Board, u8), Vec<u8>>,
    /// Receive clock in microseconds.
    clock: u64,
}

impl MockState {
    fn take_failure(&mut self, op: MockOp) -> AdapterResult<()> {
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn initialized(&mut self, board: Board) -> AdapterResult<&mut MockChannel> {
        self.channels
            .get_mut(&board)
            .filter(|ch| ch.timing.is_some())
            .ok_or(AdapterError::NotInitialized)
    }

    fn push_rx(&mut self, board: Board, msg: WireMessage) {
        let channel = self.channels.entry(board).or_default();
        channel.rx.push_back(msg);
        if let Some(event) = &channel.event {
            event.signal();
        }
    }
}

/// Mock adapter with scripted behavior and frame recording.
#[derive(Debug, Default)]
pub struct MockAdapter {
    state: Mutex<MockState>,
    /// Echo every written frame back into the board's receive queue.
    loopback: bool,
}

impl MockAdapter {
    /// Create a mock where every board is available and nothing is queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that echoes transmitted frames.
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Override the condition reported for `board` (default: available).
    pub fn set_condition(&self, board: Board, condition: ChannelCondition) {
        self.state().conditions.insert(board, condition);
    }

    /// Queue a received frame and signal the bound event.
    pub fn queue_frame(&self, board: Board, msg: WireMessage) {
        self.state().push_rx(board, msg);
    }

    /// Queue a status frame carrying `bus`.
    pub fn queue_status_frame(&self, board: Board, bus: BusStatus) {
        self.queue_frame(board, WireMessage::status(bus));
    }

    /// Bus status word returned by subsequent polls.
    pub fn set_bus_status(&self, board: Board, bus: BusStatus) {
        self.state().channels.entry(board).or_default().bus = bus;
    }

    /// Fail the next call of `op` with `err`.
    pub fn fail_next(&self, op: MockOp, err: AdapterError) {
        self.state().failures.insert(op, err);
    }

    /// Preset a parameter value for `board`.
    pub fn preset_value(&self, board: Board, id: u8, value: impl Into<Vec<u8>>) {
        self.state().values.insert((board, id), value.into());
    }

    /// Parameter value last written for `board`.
    pub fn value(&self, board: Board, id: u8) -> Option<Vec<u8>> {
        self.state().values.get(&(board, id)).cloned()
    }

    /// All frames written, in order.
    pub fn sent_frames(&self) -> Vec<WireMessage> {
        self.state().sent.iter().map(|(_, msg)| msg.clone()).collect()
    }

    /// The last frame written to `board`.
    pub fn last_sent(&self, board: Board) -> Option<WireMessage> {
        self.state()
            .sent
            .iter()
            .rev()
            .find(|(b, _)| *b == board)
            .map(|(_, msg)| msg.clone())
    }

    /// Timing the board is currently initialized with.
    pub fn initialized_with(&self, board: Board) -> Option<InitTiming> {
        self.state()
            .channels
            .get(&board)
            .and_then(|ch| ch.timing.clone())
    }

    pub fn reset_count(&self, board: Board) -> usize {
        self.state().channels.get(&board).map_or(0, |ch| ch.resets)
    }

    pub fn uninitialize_count(&self, board: Board) -> usize {
        self.state().channels.get(&board).map_or(0, |ch| ch.uninits)
    }

    /// Receive event currently bound to `board`.
    pub fn bound_event(&self, board: Board) -> Option<Arc<ReceiveEvent>> {
        self.state()
            .channels
            .get(&board)
            .and_then(|ch| ch.event.clone())
    }

    /// Frames waiting in the receive queue of `board`.
    pub fn pending(&self, board: Board) -> usize {
        self.state().channels.get(&board).map_or(0, |ch| ch.rx.len())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn channel_condition(&self, board: Board) -> AdapterResult<ChannelCondition> {
        let mut state = self.state();
        state.take_failure(MockOp::ChannelCondition)?;
        Ok(state
            .conditions
            .get(&board)
            .copied()
            .unwrap_or(ChannelCondition::Available))
    }

    async fn initialize(
        &self,
        board: Board,
        _params: &BoardParams,
        timing: &InitTiming,
    ) -> AdapterResult<()> {
        let mut state = self.state();
        state.take_failure(MockOp::Initialize)?;
        let channel = state.channels.entry(board).or_default();
        if channel.timing.is_some() {
            return Err(AdapterError::IllegalOperation);
        }
        channel.timing = Some(timing.clone());
        Ok(())
    }

    async fn uninitialize(&self, board: Board) -> AdapterResult<()> {
        let mut state = self.state();
        state.take_failure(MockOp::Uninitialize)?;
        let channel = state.initialized(board)?;
        channel.timing = None;
        channel.event = None;
        channel.rx.clear();
        channel.uninits += 1;
        Ok(())
    }

    async fn reset(&self, board: Board) -> AdapterResult<()> {
        let mut state = self.state();
        state.take_failure(MockOp::Reset)?;
        let channel = state.initialized(board)?;
        channel.rx.clear();
        channel.resets += 1;
        Ok(())
    }

    async fn read_frame(&self, board: Board, fd: bool) -> AdapterResult<WireMessage> {
        let mut state = self.state();
        state.take_failure(MockOp::Read)?;
        state.clock += 1000;
        let clock = state.clock;
        let mut msg = state
            .initialized(board)?
            .rx
            .pop_front()
            .ok_or(AdapterError::ReceiveQueueEmpty)?;
        msg.timestamp = WireTimestamp::from_micros(clock, fd);
        Ok(msg)
    }

    async fn write_frame(&self, board: Board, _fd: bool, msg: &WireMessage) -> AdapterResult<()> {
        let mut state = self.state();
        state.take_failure(MockOp::Write)?;
        state.initialized(board)?;
        state.sent.push((board, msg.clone()));
        if self.loopback {
            state.push_rx(board, msg.clone());
        }
        Ok(())
    }

    async fn bus_status(&self, board: Board) -> AdapterResult<BusStatus> {
        let mut state = self.state();
        state.take_failure(MockOp::BusStatus)?;
        Ok(state.initialized(board)?.bus)
    }

    async fn get_value(&self, board: Board, id: u8) -> AdapterResult<Vec<u8>> {
        let mut state = self.state();
        state.take_failure(MockOp::GetValue)?;
        if let Some(value) = state.values.get(&(board, id)) {
            return Ok(value.clone());
        }
        match id {
            param::API_VERSION => Ok(API_VERSION.as_bytes().to_vec()),
            param::CHANNEL_VERSION => Ok(CHANNEL_VERSION.as_bytes().to_vec()),
            param::DEVICE_NUMBER => Ok(0u32.to_le_bytes().to_vec()),
            _ => Err(AdapterError::IllegalParamType),
        }
    }

    async fn set_value(&self, board: Board, id: u8, value: &[u8]) -> AdapterResult<()> {
        let mut state = self.state();
        state.take_failure(MockOp::SetValue)?;
        state.values.insert((board, id), value.to_vec());
        Ok(())
    }

    async fn bind_receive_event(
        &self,
        board: Board,
        event: Arc<ReceiveEvent>,
    ) -> AdapterResult<()> {
        let mut state = self.state();
        state.take_failure(MockOp::BindEvent)?;
        state.initialized(board)?.event = Some(event);
        Ok(())
    }
}
