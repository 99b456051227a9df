//! End-to-end two-process test for the cnc file handshake.
//!
//! A driver process creates the cnc file, hosts a counters registry inside
//! it, signals readiness and heartbeats; an observer process discovers the
//! file, validates the version, and watches the counters advance while both
//! are running. The same test executable is re-invoked with an environment
//! variable selecting the role, so the two sides are genuinely separate OS
//! processes sharing only the mapped file.

use basalt_clock::{EpochClock, SystemEpochClock};
use basalt_cnc::MarkFile;
use basalt_cnc::layout::{
    CNC_FILE, CNC_VERSION, TIMESTAMP_FIELD_OFFSET, VERSION_FIELD_OFFSET, cnc_layout,
    counters_region_lengths, metadata_buffer, semantic_version_major, store_region_lengths,
    values_buffer,
};
use basalt_counters::{BufferPosition, CountersManager, CountersReader, Position};
use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Writes to stderr with immediate flush to bypass test output capture.
macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "BASALT_E2E_ROLE";
const ENV_DIR: &str = "BASALT_E2E_DIR";

const ROLE_DRIVER: &str = "driver";
const ROLE_OBSERVER: &str = "observer";

const NUM_COUNTERS: usize = 32;
const LIVENESS_TIMEOUT_MS: u64 = 2_000;
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(20);
const DRIVER_RUN_FOR: Duration = Duration::from_secs(3);

fn test_dir() -> String {
    format!("/tmp/basalt_e2e_cnc_{}", std::process::id())
}

/// Driver role: creates the cnc file and keeps it alive.
fn run_driver(dir: &str) {
    let clock = SystemEpochClock;
    let (metadata_length, values_length) = counters_region_lengths(NUM_COUNTERS);
    let layout = cnc_layout(metadata_length, values_length);

    log!("[DRIVER] Creating cnc file in {dir}");
    let mark_file = MarkFile::create(
        Path::new(dir),
        CNC_FILE,
        layout,
        true,
        true,
        LIVENESS_TIMEOUT_MS,
        &clock,
        &|_| true,
        &|message| log!("[DRIVER] {message}"),
    )
    .expect("driver: failed to create cnc file");

    let cnc = mark_file.buffer();
    store_region_lengths(&cnc, metadata_length, values_length);

    let mut counters = CountersManager::new(
        metadata_buffer(&cnc),
        values_buffer(&cnc),
        Box::new(SystemEpochClock),
    )
    .expect("driver: failed to construct counters manager");

    let heartbeats = counters
        .new_counter("driver-heartbeats", 0, |_| {})
        .expect("driver: failed to allocate heartbeat counter");
    let position_id = counters
        .allocate("publication-position", 1, |key| {
            key[..4].copy_from_slice(&77i32.to_le_bytes());
        })
        .expect("driver: failed to allocate position");
    let position = BufferPosition::new(counters.reader().values_buffer(), position_id);

    // Publish: heartbeat first so discoverers see a live timestamp the
    // moment the version becomes visible.
    mark_file.timestamp_ordered(clock.time());
    mark_file.signal_ready(CNC_VERSION);
    log!("[DRIVER] Ready, heartbeating every {HEARTBEAT_INTERVAL:?}");

    let deadline = Instant::now() + DRIVER_RUN_FOR;
    let mut stream_offset = 0i64;
    while Instant::now() < deadline {
        mark_file.timestamp_ordered(clock.time());
        heartbeats.increment_ordered();
        stream_offset += 64;
        position.propose_max_ordered(stream_offset);
        std::thread::sleep(HEARTBEAT_INTERVAL);
    }

    log!(
        "[DRIVER] Done: {} heartbeats, position {}",
        heartbeats.get(),
        position.get()
    );
}

/// Observer role: discovers the cnc file and watches it advance.
fn run_observer(dir: &str) {
    let clock = SystemEpochClock;

    log!("[OBSERVER] Waiting for cnc file in {dir}");
    let mark_file = MarkFile::map_existing(
        Path::new(dir),
        CNC_FILE,
        VERSION_FIELD_OFFSET,
        TIMESTAMP_FIELD_OFFSET,
        5_000,
        &clock,
        &|version| semantic_version_major(version) == semantic_version_major(CNC_VERSION),
        &|message| log!("[OBSERVER] {message}"),
    )
    .expect("observer: failed to discover cnc file");

    assert_eq!(mark_file.version_volatile(), CNC_VERSION);
    log!("[OBSERVER] Discovered version {}", mark_file.version_volatile());

    let cnc = mark_file.buffer();
    let reader = CountersReader::new(metadata_buffer(&cnc), values_buffer(&cnc));

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut snapshot: HashMap<String, i64> = HashMap::new();
    loop {
        snapshot.clear();
        reader.for_each_counter(|value, _id, label| {
            snapshot.insert(label.to_string(), value);
        });

        let heartbeats = snapshot.get("driver-heartbeats").copied().unwrap_or(0);
        let position = snapshot.get("publication-position").copied().unwrap_or(0);
        if heartbeats >= 3 && position > 0 {
            log!("[OBSERVER] Saw {heartbeats} heartbeats, position {position}");
            assert_eq!(position % 64, 0, "position advances in 64-byte steps");
            break;
        }

        assert!(
            Instant::now() < deadline,
            "observer timed out waiting for counters, saw {snapshot:?}"
        );
        std::thread::sleep(Duration::from_millis(10));
    }

    // Key and type id round-trip across the process boundary.
    let mut position_type_id = None;
    let mut position_key = [0u8; 4];
    reader.for_each_metadata(|_id, type_id, key, label| {
        if label == "publication-position" {
            position_type_id = Some(type_id);
            position_key.copy_from_slice(&key[..4]);
        }
    });
    assert_eq!(position_type_id, Some(1));
    assert_eq!(i32::from_le_bytes(position_key), 77);

    let active = MarkFile::is_active(
        &cnc,
        &clock,
        LIVENESS_TIMEOUT_MS,
        VERSION_FIELD_OFFSET,
        TIMESTAMP_FIELD_OFFSET,
        &|_| true,
        &|message| log!("[OBSERVER] {message}"),
    )
    .expect("observer: is_active failed");
    assert!(active, "driver should still be heartbeating");

    log!("[OBSERVER] Validation passed");
}

/// Two-process concurrent test: driver and observer share only the file.
#[test]
fn e2e_two_process_cnc_handshake() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let dir = env::var(ENV_DIR).expect("BASALT_E2E_DIR not set");
        match role.as_str() {
            ROLE_DRIVER => run_driver(&dir),
            ROLE_OBSERVER => run_observer(&dir),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let dir = test_dir();
    let exe = env::current_exe().expect("Failed to get current executable path");

    log!("");
    log!("E2E Two-Process Cnc Handshake Test");
    log!("cnc directory: {dir}");
    log!("");

    let mut driver_proc = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_cnc_handshake")
        .env(ENV_ROLE, ROLE_DRIVER)
        .env(ENV_DIR, &dir)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to spawn driver process");

    // The observer's own discovery loop tolerates the race with creation;
    // this delay just keeps the logs readable.
    std::thread::sleep(Duration::from_millis(50));

    let mut observer_proc = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_cnc_handshake")
        .env(ENV_ROLE, ROLE_OBSERVER)
        .env(ENV_DIR, &dir)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to spawn observer process");

    let observer_status = observer_proc.wait().expect("Failed to wait for observer");
    let driver_status = driver_proc.wait().expect("Failed to wait for driver");

    let _ = std::fs::remove_dir_all(&dir);

    assert!(
        driver_status.success(),
        "Driver process failed with status: {driver_status}"
    );
    assert!(
        observer_status.success(),
        "Observer process failed with status: {observer_status}"
    );

    log!("[ORCHESTRATOR] Two-process handshake test passed");
}
