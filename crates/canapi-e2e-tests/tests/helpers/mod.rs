//! Shared test harness for E2E integration tests.
//!
//! Wires a `ChannelTable` to a shared `MockAdapter`, exercising the real
//! lifecycle, frame engine and facade across crate boundaries.

#![allow(dead_code)]

use std::sync::Arc;

use canapi_core::{
    Board, BoardParams, ChannelTable, Driver, Handle, MockAdapter, OpMode, BitrateIndex,
};

pub const USB1: Board = Board(0x051);
pub const USB2: Board = Board(0x052);

/// End-to-end harness: one mock adapter, one channel table.
pub struct TestHarness {
    /// Scripted adapter shared with the table.
    pub adapter: Arc<MockAdapter>,
    pub table: Arc<ChannelTable>,
}

impl TestHarness {
    /// Harness whose adapter echoes every written frame.
    pub fn loopback() -> Self {
        Self::with_adapter(MockAdapter::loopback(), canapi_core::DEFAULT_CAPACITY)
    }

    /// Harness with a silent adapter; frames must be queued by the test.
    pub fn silent() -> Self {
        Self::with_adapter(MockAdapter::new(), canapi_core::DEFAULT_CAPACITY)
    }

    pub fn with_adapter(adapter: MockAdapter, capacity: usize) -> Self {
        let adapter = Arc::new(adapter);
        let table = Arc::new(ChannelTable::with_capacity(adapter.clone(), capacity));
        Self { adapter, table }
    }

    pub fn driver(&self) -> Driver {
        Driver::new(self.table.clone())
    }

    /// A driver with `board` opened in `mode` and started at 250 kbit/s.
    pub async fn started_driver(&self, board: Board, mode: OpMode) -> Driver {
        let mut driver = self.driver();
        driver
            .initialize_channel(board, mode, BoardParams::default())
            .await
            .unwrap();
        driver
            .start_controller(BitrateIndex::Kbps250.into())
            .await
            .unwrap();
        driver
    }

    /// Open `board` directly on the table and start it at 250 kbit/s.
    pub async fn started_handle(&self, board: Board) -> Handle {
        let handle = self
            .table
            .open(board, OpMode::DEFAULT, BoardParams::default())
            .await
            .unwrap();
        self.table
            .start(handle, BitrateIndex::Kbps250.into())
            .await
            .unwrap();
        handle
    }
}
