use anyhow::Context;
use basalt_clock::{EpochClock, SystemEpochClock};
use basalt_cnc::MarkFile;
use basalt_cnc::layout::{
    CNC_FILE, CNC_VERSION, TIMESTAMP_FIELD_OFFSET, VERSION_FIELD_OFFSET, metadata_buffer,
    semantic_version_major, semantic_version_minor, semantic_version_patch, values_buffer,
};
use basalt_config::BasaltConfig;
use basalt_counters::CountersReader;
use std::path::Path;
use std::time::Duration;
use tracing::info;

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
    let mark_file = MarkFile::map_existing(
        Path::new(&config.cnc_dir),
        CNC_FILE,
        VERSION_FIELD_OFFSET,
        TIMESTAMP_FIELD_OFFSET,
        config.liveness_timeout_ms,
        &clock,
        &|version| semantic_version_major(version) == semantic_version_major(CNC_VERSION),
        &|message| info!("{message}"),
    )
    .context("failed to discover cnc file")?;

    let version = mark_file.version_volatile();
    let cnc = mark_file.buffer();
    let reader = CountersReader::new(metadata_buffer(&cnc), values_buffer(&cnc));

    loop {
        let heartbeat_age_ms = clock.time() - mark_file.timestamp_volatile();

        println!(
            "{} v{}.{}.{} - heartbeat {} ms ago",
            mark_file.path().display(),
            semantic_version_major(version),
            semantic_version_minor(version),
            semantic_version_patch(version),
            heartbeat_age_ms
        );
        reader.for_each_counter(|value, id, label| {
            println!("{id:>3}: {value:>20} - {label}");
        });
        println!();

        std::thread::sleep(Duration::from_secs(1));
    }
}
