//! Sleep Prohibition Test
//!
//! All animation timing goes through tokio timers so that runs can be
//! cancelled and tests can pause the clock. A thread sleep would block the
//! runtime worker and ignore cancellation.

use architectural_enforcement::{assert_none, scan, violations, PRODUCTION_DIRS};

#[test]
fn test_no_thread_sleep_in_production_code() {
    let found = violations(scan(PRODUCTION_DIRS), "thread sleep", |line| {
        line.code.contains("thread::sleep")
    });
    assert_none(
        &found,
        "Use tokio::time::sleep (or a run's cancellable wait) instead of std::thread::sleep",
    );
}
