//! canapi-moni: CAN monitor.
//!
//! Opens the configured channel, logs every received frame as structured
//! JSON and shuts down cleanly on Ctrl-C. The `adapter` config key picks the
//! driver; only the in-process mock adapters are available.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

use canapi_core::ChannelTable;
use canapi_moni::config::MoniConfig;
use canapi_moni::monitor::{self, IdFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "canapi-moni starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/canapi/moni.toml".to_string());

    let config = MoniConfig::from_file(&config_path)?;
    tracing::info!(
        board = %config.board,
        adapter = ?config.adapter,
        mode = config.op_mode().bits(),
        timeout_ms = config.timeout_ms,
        "config loaded"
    );

    // ── Adapter ─────────────────────────────────────────────────
    let adapter = config.adapter.build();
    let table = Arc::new(ChannelTable::with_capacity(adapter, config.capacity));

    let mut driver = monitor::open(table.clone(), &config).await?;

    // ── Ctrl-C: clear the flag, then wake the blocked receive ───
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        let table = table.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                running.store(false, Ordering::SeqCst);
                table.kill_all().await;
            }
        });
    }

    tracing::info!("canapi-moni ready");
    let filter = IdFilter::from_config(&config);
    let result = monitor::run(&mut driver, config.timeout(), &filter, &running).await;

    let counters = driver.counters();
    tracing::info!(
        tx = counters.tx_messages,
        rx = counters.rx_messages,
        errors = counters.error_frames,
        "reception stopped"
    );
    if let Err(e) = driver.teardown_channel().await {
        tracing::warn!(error = %e, "teardown failed");
    }

    let frames = result?;
    tracing::info!(frames, "canapi-moni stopped");
    Ok(())
}
