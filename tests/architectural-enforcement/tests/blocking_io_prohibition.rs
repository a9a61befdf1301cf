//! Blocking I/O Prohibition Test
//!
//! File access (config, calibration history, scripts) happens in plain
//! functions at startup and shutdown. Async functions must never touch
//! `std::fs` directly.

use architectural_enforcement::{assert_none, scan, violations, PRODUCTION_DIRS};

#[test]
fn test_no_std_fs_in_async_functions() {
    let found = violations(scan(PRODUCTION_DIRS), "blocking fs in async fn", |line| {
        line.in_async_fn && line.code.contains("std::fs::")
    });
    assert_none(
        &found,
        "Move std::fs calls into a synchronous helper called outside the animation path",
    );
}
