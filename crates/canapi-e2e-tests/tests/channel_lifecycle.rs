//! E2E tests for channel lifecycle through the driver facade.

mod helpers;

use canapi_core::{
    AdapterError, BitrateIndex, BoardParams, BoardState, CanError, CanMessage, ChannelCondition,
    Counters, Handle, InitTiming, MockOp, OpMode, Timeout,
};

use helpers::{TestHarness, USB1, USB2};

/// Open → start 250K → write → read back through loopback.
#[tokio::test]
async fn e2e_loopback_round_trip() {
    let h = TestHarness::loopback();
    let mut driver = h.started_driver(USB1, OpMode::DEFAULT).await;
    assert_eq!(
        h.adapter.initialized_with(USB1),
        Some(InitTiming::Btr0Btr1(0x011C))
    );

    let sent = CanMessage::new(0x123, vec![0x01, 0x02, 0x03, 0x04]);
    driver.write_message(&sent).await.unwrap();

    let received = driver
        .read_message(Timeout::from_millis(100))
        .await
        .unwrap();
    assert_eq!(received.id, sent.id);
    assert_eq!(received.data, sent.data);
    assert_eq!(received.dlc, sent.dlc);
    assert!(!received.xtd && !received.rtr && !received.fdf);
    assert_eq!(
        driver.counters(),
        Counters {
            tx_messages: 1,
            rx_messages: 1,
            error_frames: 0
        }
    );

    let status = driver.status().await.unwrap();
    assert!(!status.can_stopped);
    assert_eq!(status.to_byte(), 0x00);
}

/// The same board cannot be opened twice, by the same or another driver.
#[tokio::test]
async fn e2e_double_open_rejected() {
    let h = TestHarness::silent();
    let mut first = h.driver();
    first
        .initialize_channel(USB1, OpMode::DEFAULT, BoardParams::default())
        .await
        .unwrap();

    let mut second = h.driver();
    assert_eq!(
        second
            .initialize_channel(USB1, OpMode::DEFAULT, BoardParams::default())
            .await,
        Err(CanError::AlreadyOpen)
    );
    assert_eq!(
        second.probe_channel(USB1, OpMode::DEFAULT).await,
        Ok(BoardState::Occupied)
    );

    first.teardown_channel().await.unwrap();
    second
        .initialize_channel(USB1, OpMode::DEFAULT, BoardParams::default())
        .await
        .unwrap();
}

/// A full table refuses further opens but still answers probes.
#[tokio::test]
async fn e2e_table_exhaustion() {
    let h = TestHarness::with_adapter(canapi_core::MockAdapter::new(), 16);
    let boards: Vec<_> = canapi_core::BOARDS.iter().map(|(b, _)| *b).collect();
    for (i, board) in boards.iter().enumerate() {
        let handle = h
            .table
            .open(*board, OpMode::DEFAULT, BoardParams::default())
            .await
            .unwrap();
        assert_eq!(handle, Handle(i));
    }
    assert_eq!(h.table.open_count().await, 16);

    let extra = canapi_core::Board(0x041);
    assert_eq!(
        h.table
            .open(extra, OpMode::DEFAULT, BoardParams::default())
            .await,
        Err(CanError::ResourceBusy)
    );
    assert_eq!(
        h.table.probe(extra, OpMode::DEFAULT).await,
        Ok(BoardState::Present)
    );

    h.table.close(Handle(7)).await.unwrap();
    assert_eq!(
        h.table
            .open(extra, OpMode::DEFAULT, BoardParams::default())
            .await,
        Ok(Handle(7))
    );
}

/// Closing twice fails the second time; out-of-range handles are invalid.
#[tokio::test]
async fn e2e_close_is_not_repeatable() {
    let h = TestHarness::silent();
    let handle = h.started_handle(USB1).await;
    h.table.close(handle).await.unwrap();
    assert_eq!(h.table.close(handle).await, Err(CanError::HandleInvalid));
    assert_eq!(
        h.table.status(Handle(1000)).await,
        Err(CanError::HandleInvalid)
    );
}

/// Stop → start re-initializes the controller and resets counters.
#[tokio::test]
async fn e2e_restart_after_stop() {
    let h = TestHarness::loopback();
    let mut driver = h.started_driver(USB1, OpMode::DEFAULT).await;
    driver
        .write_message(&CanMessage::new(0x10, vec![1]))
        .await
        .unwrap();

    driver.reset_controller().await.unwrap();
    assert!(driver.status().await.unwrap().can_stopped);
    assert_eq!(
        driver
            .start_controller(BitrateIndex::Kbps1000.into())
            .await,
        Ok(())
    );
    assert_eq!(h.adapter.reset_count(USB1), 1);
    assert_eq!(
        h.adapter.initialized_with(USB1),
        Some(InitTiming::Btr0Btr1(0x0014))
    );
    assert_eq!(driver.counters(), Counters::default());
    assert_eq!(
        driver.start_controller(BitrateIndex::Kbps1000.into()).await,
        Err(CanError::AlreadyOnline)
    );
}

/// A start that fails midway leaves the channel closable and restartable.
#[tokio::test]
async fn e2e_failed_start_recovers() {
    let h = TestHarness::silent();
    let mut driver = h.driver();
    driver
        .initialize_channel(USB2, OpMode::DEFAULT, BoardParams::default())
        .await
        .unwrap();

    h.adapter.fail_next(MockOp::BindEvent, AdapterError::Resource);
    assert!(driver
        .start_controller(BitrateIndex::Kbps250.into())
        .await
        .is_err());
    assert!(driver.status().await.unwrap().can_stopped);

    driver
        .start_controller(BitrateIndex::Kbps250.into())
        .await
        .unwrap();
    driver.teardown_channel().await.unwrap();
}

/// A restart whose re-initialization fails keeps the reset armed until a
/// start succeeds.
#[tokio::test]
async fn e2e_failed_restart_keeps_reset_armed() {
    let h = TestHarness::silent();
    let mut driver = h.started_driver(USB1, OpMode::DEFAULT).await;
    driver.reset_controller().await.unwrap();

    h.adapter.fail_next(MockOp::Reset, AdapterError::Resource);
    assert_eq!(
        driver.start_controller(BitrateIndex::Kbps500.into()).await,
        Err(CanError::Adapter(AdapterError::Resource))
    );
    assert!(driver.status().await.unwrap().can_stopped);

    h.adapter.fail_next(MockOp::Uninitialize, AdapterError::Resource);
    assert_eq!(
        driver.start_controller(BitrateIndex::Kbps500.into()).await,
        Err(CanError::Adapter(AdapterError::Resource))
    );
    assert_eq!(h.adapter.reset_count(USB1), 1);

    h.adapter.fail_next(MockOp::Initialize, AdapterError::Resource);
    assert_eq!(
        driver.start_controller(BitrateIndex::Kbps500.into()).await,
        Err(CanError::Adapter(AdapterError::Resource))
    );
    assert_eq!(h.adapter.reset_count(USB1), 2);
    assert_eq!(h.adapter.uninitialize_count(USB1), 1);

    driver
        .start_controller(BitrateIndex::Kbps500.into())
        .await
        .unwrap();
    assert_eq!(
        h.adapter.initialized_with(USB1),
        Some(InitTiming::Btr0Btr1(0x001C))
    );
    assert!(!driver.status().await.unwrap().can_stopped);
}

/// Board conditions reported by the adapter map onto open errors.
#[tokio::test]
async fn e2e_board_conditions() {
    let h = TestHarness::silent();
    h.adapter.set_condition(USB1, ChannelCondition::Unavailable);
    h.adapter.set_condition(USB2, ChannelCondition::Shared);

    let mut driver = h.driver();
    assert_eq!(
        driver.probe_channel(USB1, OpMode::DEFAULT).await,
        Ok(BoardState::NotPresent)
    );
    assert_eq!(
        driver
            .initialize_channel(USB1, OpMode::DEFAULT, BoardParams::default())
            .await,
        Err(CanError::Adapter(AdapterError::IllegalHardware))
    );
    assert_eq!(
        driver
            .initialize_channel(USB2, OpMode::DEFAULT, BoardParams::default())
            .await,
        Err(CanError::AlreadyOpen)
    );
    driver
        .initialize_channel(USB2, OpMode::SHRD, BoardParams::default())
        .await
        .unwrap();
}
