//! Shared helpers for integration tests

#![allow(dead_code)]

use libcoport::{CoportConfig, CoportEngine, REFERENCE_SIZE};

/// Route engine tracing to the test harness once per binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Small engine with `ring_slots` references per ring
pub fn engine_with_ring(ring_slots: usize) -> CoportEngine {
    init_tracing();
    let mut config = CoportConfig::default();
    config.table.ring_ports = 8;
    config.table.rendezvous_ports = 4;
    config.table.stream_ports = 4;
    config.transfer.ring_buffer_bytes = ring_slots * REFERENCE_SIZE;
    config.notifier.workers = 2;
    CoportEngine::new(config).expect("engine should start")
}

pub fn engine() -> CoportEngine {
    engine_with_ring(16)
}

/// Spin until `condition` holds, failing the test after ten seconds
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while !condition() {
        assert!(
            std::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}
