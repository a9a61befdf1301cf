//! Panic Prohibition Test
//!
//! The engine library reports failures through `Result` and callbacks.
//! A panic inside a run task would leave the machine stuck mid-line.

use architectural_enforcement::{assert_none, scan, violations, LIBRARY_DIR};

#[test]
fn test_no_unwrap_or_expect_in_library() {
    let found = violations(scan(&[LIBRARY_DIR]), "unwrap/expect", |line| {
        line.code.contains(".unwrap()") || line.code.contains(".expect(")
    });
    assert_none(&found, "Propagate errors with `?` in chazy-core instead of panicking");
}

#[test]
fn test_no_explicit_panics_in_library() {
    let found = violations(scan(&[LIBRARY_DIR]), "panic!", |line| {
        line.code.contains("panic!(") || line.code.contains("unimplemented!(")
    });
    assert_none(&found, "Return an error instead of panicking in chazy-core");
}
