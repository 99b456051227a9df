use anyhow::Context;
use basalt_clock::{EpochClock, SystemEpochClock};
use basalt_cnc::MarkFile;
use basalt_cnc::layout::{
    CNC_FILE, CNC_VERSION, cnc_layout, counters_region_lengths, metadata_buffer,
    store_region_lengths, values_buffer,
};
use basalt_config::BasaltConfig;
use basalt_counters::{BufferPosition, CountersManager, Position};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "basalt.toml".into());
    let config = BasaltConfig::load_or_default(config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    let clock = SystemEpochClock;
    let (metadata_length, values_length) = counters_region_lengths(config.counters_capacity);
    let layout = cnc_layout(metadata_length, values_length);

    let mark_file = MarkFile::create(
        Path::new(&config.cnc_dir),
        CNC_FILE,
        layout,
        true,
        false,
        config.liveness_timeout_ms,
        &clock,
        &|_| true,
        &|message| warn!("{message}"),
    )
    .context("failed to create cnc file")?;

    let cnc = mark_file.buffer();
    store_region_lengths(&cnc, metadata_length, values_length);

    let mut counters = CountersManager::new(
        metadata_buffer(&cnc),
        values_buffer(&cnc),
        Box::new(SystemEpochClock),
    )
    .context("failed to construct counters registry")?;

    let heartbeats = counters
        .new_counter("driver-heartbeats", 0, |_| {})
        .context("failed to allocate heartbeat counter")?;
    let errors = counters
        .new_counter("driver-errors", 0, |_| {})
        .context("failed to allocate error counter")?;
    let position_id = counters
        .allocate("publication-position", 1, |_| {})
        .context("failed to allocate publication position")?;
    let position = BufferPosition::new(counters.reader().values_buffer(), position_id);

    // Heartbeat before signalling ready so discoverers never observe a
    // published version without a live timestamp behind it.
    mark_file.timestamp_ordered(clock.time());
    mark_file.signal_ready(CNC_VERSION);
    info!(
        "cnc file ready at {} ({} counter slots)",
        mark_file.path().display(),
        config.counters_capacity
    );

    let interval = Duration::from_millis(config.heartbeat_interval_ms);
    let mut stream_offset = 0i64;
    loop {
        std::thread::sleep(interval);

        mark_file.timestamp_ordered(clock.time());
        heartbeats.increment_ordered();

        // Stand-in for real publication progress so observers have a
        // moving position to watch.
        stream_offset += 4_096;
        position.propose_max_ordered(stream_offset);

        let beats = heartbeats.get();
        if beats % 10 == 0 {
            info!(
                "alive: {beats} heartbeats, position {}, {} errors",
                position.get(),
                errors.get()
            );
        }
    }
}
